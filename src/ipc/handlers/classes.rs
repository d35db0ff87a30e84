use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn year_param(req: &Request) -> Option<i64> {
    req.params.get("year").and_then(|v| v.as_i64())
}

fn handle_classes_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(year) = year_param(req) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let class_code = match req.params.get("classCode").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing classCode", None),
    };
    let coordinator = req
        .params
        .get("coordinator")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, year, class_code, coordinator) VALUES(?, ?, ?, ?)
         ON CONFLICT(year, class_code) DO UPDATE SET coordinator = excluded.coordinator",
        (&class_id, year, &class_code, &coordinator),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    // The insert id is discarded on conflict; read back the surviving row.
    match db::class_id(conn, year, &class_code) {
        Ok(Some(id)) => ok(
            &req.id,
            json!({ "classId": id, "year": year, "classCode": class_code }),
        ),
        Ok(None) => err(&req.id, "db_query_failed", "class vanished after upsert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Include a student count so the caller can show a dashboard without a
    // follow-up query per class.
    let (sql, year) = match year_param(req) {
        Some(y) => (
            "SELECT c.id, c.year, c.class_code, c.coordinator,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
             FROM classes c WHERE c.year = ? ORDER BY c.class_code",
            Some(y),
        ),
        None => (
            "SELECT c.id, c.year, c.class_code, c.coordinator,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
             FROM classes c ORDER BY c.year, c.class_code",
            None,
        ),
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "year": row.get::<_, i64>(1)?,
            "classCode": row.get::<_, String>(2)?,
            "coordinator": row.get::<_, Option<String>>(3)?,
            "studentCount": row.get::<_, i64>(4)?,
        }))
    };
    let rows = match year {
        Some(y) => stmt
            .query_map([y], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    };

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_batches_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(year) = year_param(req) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let class_code = match req.params.get("classCode").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classCode", None),
    };
    let batch_code = match req.params.get("batchCode").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing batchCode", None),
    };
    let mentor = req
        .params
        .get("mentor")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let class_id = match db::class_id(conn, year, &class_code) {
        Ok(Some(id)) => id,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let batch_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO batches(id, class_id, batch_code, mentor) VALUES(?, ?, ?, ?)
         ON CONFLICT(batch_code) DO UPDATE
         SET class_id = excluded.class_id, mentor = excluded.mentor",
        (&batch_id, &class_id, &batch_code, &mentor),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    let batch_id: String = match tx.query_row(
        "SELECT id FROM batches WHERE batch_code = ?",
        [&batch_code],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_query_failed", e.to_string(), None);
        }
    };

    // Roster and curriculum rows are replaced wholesale when provided.
    if let Some(roll_nos) = req.params.get("rollNos").and_then(|v| v.as_array()) {
        if let Err(e) = tx.execute("DELETE FROM batch_roll_nos WHERE batch_id = ?", [&batch_id]) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        for (idx, roll) in roll_nos.iter().enumerate() {
            let Some(roll) = roll.as_str() else {
                let _ = tx.rollback();
                return err(&req.id, "bad_params", "rollNos must be strings", None);
            };
            if let Err(e) = tx.execute(
                "INSERT INTO batch_roll_nos(batch_id, idx, roll_no) VALUES(?, ?, ?)",
                (&batch_id, idx as i64, roll),
            ) {
                let _ = tx.rollback();
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        }
    }

    if let Some(subjects) = req.params.get("theorySubjects").and_then(|v| v.as_array()) {
        if let Err(e) = tx.execute("DELETE FROM theory_subjects WHERE batch_id = ?", [&batch_id]) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        for (idx, subject) in subjects.iter().enumerate() {
            let title = subject.get("title").and_then(|v| v.as_str());
            let teacher = subject.get("teacher").and_then(|v| v.as_str());
            let (Some(title), Some(teacher)) = (title, teacher) else {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "bad_params",
                    "theorySubjects entries need title and teacher",
                    None,
                );
            };
            let elective_group = subject.get("electiveGroup").and_then(|v| v.as_str());
            if let Err(e) = tx.execute(
                "INSERT INTO theory_subjects(batch_id, idx, title, elective_group, teacher)
                 VALUES(?, ?, ?, ?, ?)",
                (&batch_id, idx as i64, title, elective_group, teacher),
            ) {
                let _ = tx.rollback();
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        }
    }

    if let Some(subjects) = req.params.get("practicalSubjects").and_then(|v| v.as_array()) {
        if let Err(e) = tx.execute(
            "DELETE FROM practical_subjects WHERE batch_id = ?",
            [&batch_id],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        for (idx, subject) in subjects.iter().enumerate() {
            let title = subject.get("title").and_then(|v| v.as_str());
            let teacher = subject.get("teacher").and_then(|v| v.as_str());
            let count = subject.get("assignmentCount").and_then(|v| v.as_i64());
            let (Some(title), Some(teacher), Some(count)) = (title, teacher, count) else {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "bad_params",
                    "practicalSubjects entries need title, teacher and assignmentCount",
                    None,
                );
            };
            if let Err(e) = tx.execute(
                "INSERT INTO practical_subjects(batch_id, idx, title, assignment_count, teacher)
                 VALUES(?, ?, ?, ?, ?)",
                (&batch_id, idx as i64, title, count, teacher),
            ) {
                let _ = tx.rollback();
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "batchId": batch_id, "batchCode": batch_code }))
}

fn handle_batches_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "batches": [] }));
    };

    let Some(year) = year_param(req) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let class_code = match req.params.get("classCode").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classCode", None),
    };
    let class_id = match db::class_id(conn, year, &class_code) {
        Ok(Some(id)) => id,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let batches = (|| -> rusqlite::Result<Vec<serde_json::Value>> {
        let mut stmt = conn.prepare(
            "SELECT id, batch_code, mentor FROM batches WHERE class_id = ? ORDER BY batch_code",
        )?;
        let heads: Vec<(String, String, Option<String>)> = stmt
            .query_map([&class_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut out = Vec::with_capacity(heads.len());
        for (batch_id, batch_code, mentor) in heads {
            let mut stmt = conn.prepare(
                "SELECT roll_no FROM batch_roll_nos WHERE batch_id = ? ORDER BY idx",
            )?;
            let roll_nos: Vec<String> = stmt
                .query_map([&batch_id], |r| r.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            let mut stmt = conn.prepare(
                "SELECT title, elective_group, teacher FROM theory_subjects
                 WHERE batch_id = ? ORDER BY idx",
            )?;
            let theory: Vec<serde_json::Value> = stmt
                .query_map([&batch_id], |r| {
                    Ok(json!({
                        "title": r.get::<_, String>(0)?,
                        "electiveGroup": r.get::<_, Option<String>>(1)?,
                        "teacher": r.get::<_, String>(2)?,
                    }))
                })?
                .collect::<rusqlite::Result<_>>()?;

            let mut stmt = conn.prepare(
                "SELECT title, assignment_count, teacher FROM practical_subjects
                 WHERE batch_id = ? ORDER BY idx",
            )?;
            let practical: Vec<serde_json::Value> = stmt
                .query_map([&batch_id], |r| {
                    Ok(json!({
                        "title": r.get::<_, String>(0)?,
                        "assignmentCount": r.get::<_, i64>(1)?,
                        "teacher": r.get::<_, String>(2)?,
                    }))
                })?
                .collect::<rusqlite::Result<_>>()?;

            out.push(json!({
                "id": batch_id,
                "batchCode": batch_code,
                "mentor": mentor,
                "rollNos": roll_nos,
                "theorySubjects": theory,
                "practicalSubjects": practical,
            }));
        }
        Ok(out)
    })();

    match batches {
        Ok(batches) => ok(&req.id, json!({ "batches": batches })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.upsert" => Some(handle_classes_upsert(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "batches.upsert" => Some(handle_batches_upsert(state, req)),
        "batches.list" => Some(handle_batches_list(state, req)),
        _ => None,
    }
}
