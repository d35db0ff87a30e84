use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_students_upsert_many(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let class_code = match req.params.get("classCode").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classCode", None),
    };
    let students = match req.params.get("students").and_then(|v| v.as_array()) {
        Some(v) => v.clone(),
        None => return err(&req.id, "bad_params", "missing students", None),
    };

    let class_id = match db::class_id(conn, year, &class_code) {
        Ok(Some(id)) => id,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let mut upserted = 0_usize;
    for student in &students {
        let roll_no = student.get("rollNo").and_then(|v| v.as_str());
        let name = student.get("name").and_then(|v| v.as_str());
        let (Some(roll_no), Some(name)) = (roll_no, name) else {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                "students entries need rollNo and name",
                None,
            );
        };
        if let Err(e) = tx.execute(
            "INSERT INTO students(roll_no, class_id, name) VALUES(?, ?, ?)
             ON CONFLICT(roll_no) DO UPDATE
             SET class_id = excluded.class_id, name = excluded.name",
            (roll_no, &class_id, name),
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        // Every student gets a records row so attendance updates are plain
        // UPDATEs later on.
        if let Err(e) = tx.execute(
            "INSERT OR IGNORE INTO student_records(roll_no) VALUES(?)",
            [roll_no],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        upserted += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "upserted": upserted }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
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

    let mut stmt = match conn.prepare("SELECT roll_no, name FROM students WHERE class_id = ?") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: rusqlite::Result<Vec<(String, String)>> = stmt
        .query_map([&class_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect());

    match rows {
        Ok(mut students) => {
            students.sort_by(|a, b| crate::stats::roll_no_cmp(&a.0, &b.0));
            let students: Vec<serde_json::Value> = students
                .into_iter()
                .map(|(roll_no, name)| json!({ "rollNo": roll_no, "name": name }))
                .collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.upsertMany" => Some(handle_students_upsert_many(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
