use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "enrollments": [] }));
    };
    match db::enrollments_list(conn) {
        Ok(rows) => ok(&req.id, json!({ "enrollments": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_enrollments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match param_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match db::enrollment_get(conn, id) {
        Ok(Some(rec)) => ok(&req.id, json!({ "enrollment": rec })),
        Ok(None) => err(&req.id, "not_found", "enrollment not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "enrollments.get" => Some(handle_enrollments_get(state, req)),
        _ => None,
    }
}
