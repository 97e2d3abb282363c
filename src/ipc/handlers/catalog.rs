use crate::catalog::{
    grade_options, normalize_catalog, validate_catalog, FeeCatalog, SqliteCatalog,
};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{catalog_err, param_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::FeeStructure;
use log::{error, info};
use serde_json::json;

fn handle_catalog_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "feeStructures": [] }));
    };
    match SqliteCatalog::new(conn).load_fee_structures() {
        Ok(v) => ok(&req.id, json!({ "feeStructures": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_catalog_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "grades": [] }));
    };
    match SqliteCatalog::new(conn).load_fee_structures() {
        Ok(v) => ok(&req.id, json!({ "grades": grade_options(&v) })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn read_import_payload(req: &Request) -> Result<Vec<FeeStructure>, serde_json::Value> {
    if let Some(raw) = req.params.get("feeStructures") {
        return serde_json::from_value(raw.clone())
            .map_err(|e| err(&req.id, "bad_params", format!("feeStructures: {}", e), None));
    }
    let Some(path) = req.params.get("path").and_then(|v| v.as_str()) else {
        return Err(err(
            &req.id,
            "bad_params",
            "missing feeStructures or path",
            None,
        ));
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path })),
        )
    })?;
    serde_json::from_str(&text).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("catalog file is not a fee structure list: {}", e),
            Some(json!({ "path": path })),
        )
    })
}

fn handle_catalog_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut structures = match read_import_payload(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    normalize_catalog(&mut structures);
    if let Err(e) = validate_catalog(&structures) {
        return catalog_err(&req.id, e);
    }
    let replace = req
        .params
        .get("replace")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    match SqliteCatalog::new(conn).import(&structures, replace) {
        Ok(n) => {
            info!("imported {} fee structures (replace={})", n, replace);
            ok(&req.id, json!({ "imported": n }))
        }
        Err(e) => {
            error!("catalog import failed: {:?}", e);
            err(&req.id, "db_tx_failed", e.to_string(), None)
        }
    }
}

fn handle_catalog_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("feeStructure") else {
        return err(&req.id, "bad_params", "missing feeStructure", None);
    };
    let mut fs: FeeStructure = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("feeStructure: {}", e), None),
    };
    normalize_catalog(std::slice::from_mut(&mut fs));
    if let Err(e) = validate_catalog(std::slice::from_ref(&fs)) {
        return catalog_err(&req.id, e);
    }
    match SqliteCatalog::new(conn).upsert(&fs) {
        Ok(id) => {
            info!("fee structure {} saved for grade {}", id, fs.grades);
            ok(&req.id, json!({ "id": id }))
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_catalog_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match param_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match SqliteCatalog::new(conn).delete(id) {
        Ok(true) => {
            info!("fee structure {} deleted", id);
            ok(&req.id, json!({ "ok": true }))
        }
        Ok(false) => err(&req.id, "not_found", "fee structure not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.list" => Some(handle_catalog_list(state, req)),
        "catalog.grades" => Some(handle_catalog_grades(state, req)),
        "catalog.import" => Some(handle_catalog_import(state, req)),
        "catalog.upsert" => Some(handle_catalog_upsert(state, req)),
        "catalog.delete" => Some(handle_catalog_delete(state, req)),
        _ => None,
    }
}
