use crate::catalog::CatalogError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::FeeStructure;
use crate::wizard::WizardError;
use rusqlite::Connection;

pub fn require_db<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn param_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn param_bool(req: &Request, key: &str) -> Result<bool, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(false),
        Some(v) if v.is_null() => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a boolean", key), None)),
    }
}

/// Inline catalog from `params.feeStructures`, validated. `Ok(None)` when the
/// request carries none.
pub fn inline_catalog(req: &Request) -> Result<Option<Vec<FeeStructure>>, serde_json::Value> {
    let Some(raw) = req.params.get("feeStructures").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let mut structures: Vec<FeeStructure> = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("feeStructures: {}", e),
            None,
        )
    })?;
    crate::catalog::normalize_catalog(&mut structures);
    crate::catalog::validate_catalog(&structures).map_err(|e| catalog_err(&req.id, e))?;
    Ok(Some(structures))
}

pub fn catalog_err(id: &str, e: CatalogError) -> serde_json::Value {
    err(id, &e.code, e.message, e.details)
}

pub fn wizard_err(id: &str, e: WizardError) -> serde_json::Value {
    err(id, &e.code, e.message, e.details)
}
