use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn ticket_json(ticket: &db::Ticket) -> serde_json::Value {
    json!({
        "academicYear": ticket.academic_year,
        "semester": ticket.semester,
        "institution": ticket.institution,
        "department": ticket.department,
        "minAttendanceRequired": ticket.min_attendance_required,
        "minUTMarksRequired": ticket.min_ut_marks_required,
    })
}

fn handle_ticket_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match db::load_ticket(conn) {
        Ok(ticket) => ok(&req.id, json!({ "ticket": ticket_json(&ticket) })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_ticket_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Partial update over the current (or default) snapshot.
    let mut ticket = match db::load_ticket(conn) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Some(v) = req.params.get("academicYear").and_then(|v| v.as_str()) {
        ticket.academic_year = Some(v.to_string());
    }
    if let Some(v) = req.params.get("semester").and_then(|v| v.as_i64()) {
        if !(1..=8).contains(&v) {
            return err(&req.id, "bad_params", "semester must be 1-8", None);
        }
        ticket.semester = Some(v);
    }
    if let Some(v) = req.params.get("institution").and_then(|v| v.as_str()) {
        ticket.institution = v.to_string();
    }
    if let Some(v) = req.params.get("department").and_then(|v| v.as_str()) {
        ticket.department = v.to_string();
    }
    if let Some(v) = req
        .params
        .get("minAttendanceRequired")
        .and_then(|v| v.as_f64())
    {
        if !(0.0..=100.0).contains(&v) {
            return err(&req.id, "bad_params", "minAttendanceRequired must be 0-100", None);
        }
        ticket.min_attendance_required = v;
    }
    if let Some(v) = req
        .params
        .get("minUTMarksRequired")
        .and_then(|v| v.as_f64())
    {
        if !(0.0..=30.0).contains(&v) {
            return err(&req.id, "bad_params", "minUTMarksRequired must be 0-30", None);
        }
        ticket.min_ut_marks_required = v;
    }

    let saved = conn.execute(
        "INSERT INTO ticket_data(id, academic_year, semester, institution, department,
                                 min_attendance_required, min_ut_marks_required)
         VALUES(1, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE
         SET academic_year = excluded.academic_year,
             semester = excluded.semester,
             institution = excluded.institution,
             department = excluded.department,
             min_attendance_required = excluded.min_attendance_required,
             min_ut_marks_required = excluded.min_ut_marks_required",
        (
            &ticket.academic_year,
            ticket.semester,
            &ticket.institution,
            &ticket.department,
            ticket.min_attendance_required,
            ticket.min_ut_marks_required,
        ),
    );
    match saved {
        Ok(_) => ok(&req.id, json!({ "ticket": ticket_json(&ticket) })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.ticketGet" => Some(handle_ticket_get(state, req)),
        "setup.ticketUpdate" => Some(handle_ticket_update(state, req)),
        _ => None,
    }
}
