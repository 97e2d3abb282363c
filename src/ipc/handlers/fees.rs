use crate::calc::{calculate_fee, FeeAdjustments};
use crate::catalog::{FeeCatalog, SqliteCatalog, StaticCatalog};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_fee_rules;
use crate::ipc::helpers::{inline_catalog, param_bool};
use crate::ipc::types::{AppState, Request};
use crate::model::SiblingDetail;
use serde_json::json;

fn handle_fees_calculate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let details: Vec<SiblingDetail> = match req.params.get("details") {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", format!("details: {}", e), None),
        },
        None => return err(&req.id, "bad_params", "missing details", None),
    };
    let adjustments = FeeAdjustments {
        ac_charges: match param_bool(req, "acCharges") {
            Ok(v) => v,
            Err(resp) => return resp,
        },
        deserving_discount: match param_bool(req, "deservingDiscount") {
            Ok(v) => v,
            Err(resp) => return resp,
        },
    };

    let inline = match inline_catalog(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let loaded = match (inline, state.db.as_ref()) {
        (Some(structures), _) => StaticCatalog(structures).load_fee_structures(),
        (None, Some(conn)) => SqliteCatalog::new(conn).load_fee_structures(),
        (None, None) => {
            return err(
                &req.id,
                "no_workspace",
                "select a workspace or pass feeStructures",
                None,
            )
        }
    };
    let structures = match loaded {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rules = match load_fee_rules(state.db.as_ref()) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let breakdown = calculate_fee(&details, &structures, &rules, adjustments);
    ok(&req.id, json!(breakdown))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.calculate" => Some(handle_fees_calculate(state, req)),
        _ => None,
    }
}
