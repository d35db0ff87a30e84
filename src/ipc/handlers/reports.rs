use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report;
use crate::sheets::SpreadsheetFile;
use serde_json::json;

const DEFAULT_SPREADSHEET_ID: &str = "master";

fn handle_master_ut_model(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let ticket = match db::load_ticket(conn) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match report::master_ut_model(conn, &ticket, year, &class_code) {
        Ok(model) => {
            let model = match serde_json::to_value(&model) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "internal", e.to_string(), None),
            };
            ok(&req.id, json!({ "model": model }))
        }
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_generate_master_ut(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let years: Vec<i64> = match req.params.get("years").and_then(|v| v.as_array()) {
        Some(list) => {
            let mut years = Vec::with_capacity(list.len());
            for v in list {
                match v.as_i64() {
                    Some(y) => years.push(y),
                    None => return err(&req.id, "bad_params", "years must be integers", None),
                }
            }
            years
        }
        None => match req.params.get("year").and_then(|v| v.as_i64()) {
            Some(y) => vec![y],
            None => return err(&req.id, "bad_params", "missing years", None),
        },
    };
    if years.is_empty() {
        return err(&req.id, "bad_params", "years must not be empty", None);
    }

    let spreadsheet_id = req
        .params
        .get("spreadsheetId")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_SPREADSHEET_ID)
        .to_string();

    let mut store = SpreadsheetFile::new(workspace.join("spreadsheets"));
    match report::generate_master_report(conn, &mut store, &spreadsheet_id, &years) {
        Ok(manifest) => {
            let manifest = match serde_json::to_value(&manifest) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "internal", e.to_string(), None),
            };
            ok(&req.id, json!({ "manifest": manifest }))
        }
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.masterUtModel" => Some(handle_master_ut_model(state, req)),
        "reports.generateMasterUt" => Some(handle_generate_master_ut(state, req)),
        _ => None,
    }
}
