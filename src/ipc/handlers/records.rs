use crate::error::ReportError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const MAX_UT_MARK: f64 = 30.0;

/// Theory curriculum of the student's class, drawn from its first batch.
fn curriculum_for(
    conn: &Connection,
    roll_no: &str,
) -> Result<(String, Vec<String>), ReportError> {
    let class: Option<(String, String)> = conn
        .query_row(
            "SELECT c.id, c.class_code FROM students s
             JOIN classes c ON c.id = s.class_id
             WHERE s.roll_no = ?",
            [roll_no],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((class_id, class_code)) = class else {
        return Err(ReportError::BadInput(format!("unknown student {}", roll_no)));
    };

    let batch_id: Option<String> = conn
        .query_row(
            "SELECT id FROM batches WHERE class_id = ? ORDER BY batch_code LIMIT 1",
            [&class_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(batch_id) = batch_id else {
        return Err(ReportError::MissingCurriculum(class_code));
    };

    let mut stmt =
        conn.prepare("SELECT title FROM theory_subjects WHERE batch_id = ? ORDER BY idx")?;
    let titles: Vec<String> = stmt
        .query_map([&batch_id], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok((class_code, titles))
}

fn handle_update_attendance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let roll_no = match req.params.get("rollNo").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rollNo", None),
    };
    let attendance = match req.params.get("attendance").and_then(|v| v.as_f64()) {
        Some(v) if (0.0..=100.0).contains(&v) => v,
        Some(_) => return err(&req.id, "bad_params", "attendance must be 0-100", None),
        None => return err(&req.id, "bad_params", "missing attendance", None),
    };

    // The defaulter flag is derived, never client-supplied.
    let ticket = match crate::db::load_ticket(conn) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let below_threshold = attendance < ticket.min_attendance_required;

    let updated = conn.execute(
        "INSERT INTO student_records(roll_no, attendance, below_threshold)
         VALUES(?, ?, ?)
         ON CONFLICT(roll_no) DO UPDATE
         SET attendance = excluded.attendance,
             below_threshold = excluded.below_threshold",
        (&roll_no, attendance, below_threshold),
    );
    match updated {
        Ok(_) => ok(
            &req.id,
            json!({
                "rollNo": roll_no,
                "attendance": attendance,
                "belowThreshold": below_threshold,
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_update_unit_tests(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let roll_no = match req.params.get("rollNo").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rollNo", None),
    };
    let entries = match req.params.get("entries").and_then(|v| v.as_array()) {
        Some(v) => v.clone(),
        None => return err(&req.id, "bad_params", "missing entries", None),
    };

    let (class_code, curriculum) = match curriculum_for(conn, &roll_no) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };

    // Validate everything before writing anything.
    for entry in &entries {
        let Some(subject) = entry.get("subject").and_then(|v| v.as_str()) else {
            return err(&req.id, "bad_params", "entries need a subject", None);
        };
        if !curriculum.iter().any(|t| t == subject) {
            let e = ReportError::SubjectNotInCurriculum {
                class_code: class_code.clone(),
                subject: subject.to_string(),
            };
            return err(&req.id, e.code(), e.to_string(), None);
        }
        for key in ["ut1", "ut2"] {
            if let Some(mark) = entry.get(key).and_then(|v| v.as_f64()) {
                if !(0.0..=MAX_UT_MARK).contains(&mark) {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("{} must be 0-{}", key, MAX_UT_MARK),
                        None,
                    );
                }
            }
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for entry in &entries {
        let subject = entry
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let ut1_absent = entry
            .get("ut1Absent")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let ut2_absent = entry
            .get("ut2Absent")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        // An absence flag wins over any mark sent alongside it.
        let ut1 = if ut1_absent {
            None
        } else {
            entry.get("ut1").and_then(|v| v.as_f64())
        };
        let ut2 = if ut2_absent {
            None
        } else {
            entry.get("ut2").and_then(|v| v.as_f64())
        };

        if let Err(e) = tx.execute(
            "INSERT INTO unit_test_marks(roll_no, subject, ut1, ut2, ut1_absent, ut2_absent)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(roll_no, subject) DO UPDATE
             SET ut1 = excluded.ut1, ut2 = excluded.ut2,
                 ut1_absent = excluded.ut1_absent, ut2_absent = excluded.ut2_absent",
            (&roll_no, subject, ut1, ut2, ut1_absent, ut2_absent),
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "rollNo": roll_no, "updated": entries.len() }))
}

fn handle_update_assignments(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let roll_no = match req.params.get("rollNo").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rollNo", None),
    };
    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing subject", None),
    };
    let marks = match req.params.get("marks").and_then(|v| v.as_array()) {
        Some(v) => v.clone(),
        None => return err(&req.id, "bad_params", "missing marks", None),
    };
    let all_completed = req
        .params
        .get("allCompleted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // The subject must be a practical in the class curriculum and the marks
    // list must fit its assignment count.
    let class_code: String = match conn
        .query_row(
            "SELECT c.class_code FROM students s
             JOIN classes c ON c.id = s.class_id
             WHERE s.roll_no = ?",
            [&roll_no],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "bad_params", format!("unknown student {}", roll_no), None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let assignment_count: Option<i64> = match conn
        .query_row(
            "SELECT p.assignment_count FROM practical_subjects p
             WHERE p.title = ? AND p.batch_id = (
               SELECT id FROM batches WHERE class_id =
                 (SELECT class_id FROM students WHERE roll_no = ?)
               ORDER BY batch_code LIMIT 1
             )",
            (&subject, &roll_no),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(assignment_count) = assignment_count else {
        let e = ReportError::SubjectNotInCurriculum {
            class_code,
            subject: subject.clone(),
        };
        return err(&req.id, e.code(), e.to_string(), None);
    };
    if marks.len() as i64 > assignment_count {
        return err(
            &req.id,
            "bad_params",
            format!("expected at most {} assignment marks", assignment_count),
            None,
        );
    }

    let marks_text = match serde_json::to_string(&marks) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let updated = conn.execute(
        "INSERT INTO assignment_records(roll_no, subject, marks, all_completed)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(roll_no, subject) DO UPDATE
         SET marks = excluded.marks, all_completed = excluded.all_completed",
        (&roll_no, &subject, &marks_text, all_completed),
    );
    match updated {
        Ok(_) => ok(&req.id, json!({ "rollNo": roll_no, "subject": subject })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_records_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let roll_no = match req.params.get("rollNo").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rollNo", None),
    };

    let record = (|| -> rusqlite::Result<serde_json::Value> {
        let attendance: Option<(Option<f64>, Option<bool>)> = conn
            .query_row(
                "SELECT attendance, below_threshold FROM student_records WHERE roll_no = ?",
                [&roll_no],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let mut stmt = conn.prepare(
            "SELECT subject, ut1, ut2, ut1_absent, ut2_absent
             FROM unit_test_marks WHERE roll_no = ? ORDER BY subject",
        )?;
        let unit_tests: Vec<serde_json::Value> = stmt
            .query_map([&roll_no], |r| {
                Ok(json!({
                    "subject": r.get::<_, String>(0)?,
                    "ut1": r.get::<_, Option<f64>>(1)?,
                    "ut2": r.get::<_, Option<f64>>(2)?,
                    "ut1Absent": r.get::<_, bool>(3)?,
                    "ut2Absent": r.get::<_, bool>(4)?,
                }))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = conn.prepare(
            "SELECT subject, marks, all_completed
             FROM assignment_records WHERE roll_no = ? ORDER BY subject",
        )?;
        let assignments: Vec<serde_json::Value> = stmt
            .query_map([&roll_no], |r| {
                let marks_text: String = r.get(1)?;
                Ok(json!({
                    "subject": r.get::<_, String>(0)?,
                    "marks": serde_json::from_str::<serde_json::Value>(&marks_text)
                        .unwrap_or(serde_json::Value::Null),
                    "allCompleted": r.get::<_, bool>(2)?,
                }))
            })?
            .collect::<rusqlite::Result<_>>()?;

        Ok(json!({
            "rollNo": roll_no,
            "attendance": attendance.as_ref().and_then(|(a, _)| *a),
            "belowThreshold": attendance.as_ref().and_then(|(_, flag)| *flag),
            "unitTests": unit_tests,
            "assignments": assignments,
        }))
    })();

    match record {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.updateAttendance" => Some(handle_update_attendance(state, req)),
        "records.updateUnitTests" => Some(handle_update_unit_tests(state, req)),
        "records.updateAssignments" => Some(handle_update_assignments(state, req)),
        "records.get" => Some(handle_records_get(state, req)),
        _ => None,
    }
}
