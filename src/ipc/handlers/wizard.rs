use crate::catalog::{FeeCatalog, SqliteCatalog, StaticCatalog};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{load_fee_rules, load_max_siblings};
use crate::ipc::helpers::{inline_catalog, param_str, wizard_err};
use crate::ipc::types::{AppState, Request};
use crate::wizard::{Wizard, WizardEvent};
use log::{debug, error, info, warn};
use serde_json::json;
use uuid::Uuid;

fn handle_wizard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let inline = match inline_catalog(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let conn = state.db.as_ref();
    let loaded = match (inline, conn) {
        (Some(structures), _) => StaticCatalog(structures).load_fee_structures(),
        (None, Some(c)) => SqliteCatalog::new(c).load_fee_structures(),
        (None, None) => {
            return err(
                &req.id,
                "no_workspace",
                "select a workspace or pass feeStructures",
                None,
            )
        }
    };
    let catalog = match loaded {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rules = match load_fee_rules(conn) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let max_siblings = match load_max_siblings(conn) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let session_id = Uuid::new_v4().to_string();
    let wizard = Wizard::new(catalog, rules, max_siblings);
    let view = wizard.view();
    state.wizards.insert(session_id.clone(), wizard);
    info!(
        "wizard session {} opened ({} grades)",
        session_id,
        view.grade_options.len()
    );
    ok(&req.id, json!({ "sessionId": session_id, "view": view }))
}

fn session<'a>(state: &'a mut AppState, req: &Request) -> Result<(String, &'a mut Wizard), serde_json::Value> {
    let id = param_str(req, "sessionId")?.to_string();
    match state.wizards.get_mut(&id) {
        Some(w) => Ok((id, w)),
        None => Err(err(
            &req.id,
            "not_found",
            "wizard session not found",
            Some(json!({ "sessionId": id })),
        )),
    }
}

fn handle_wizard_event(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("event") else {
        return err(&req.id, "bad_params", "missing event", None);
    };
    let event: WizardEvent = match serde_json::from_value(raw.clone()) {
        Ok(e) => e,
        Err(e) => return err(&req.id, "bad_params", format!("event: {}", e), None),
    };
    let (id, wizard) = match session(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match wizard.transition(event.clone()) {
        Ok(step) => {
            debug!("wizard {} {:?} -> {:?}", id, event, step);
            ok(&req.id, json!({ "view": wizard.view() }))
        }
        Err(e) => {
            warn!("wizard {} rejected {:?}: {}", id, event, e);
            wizard_err(&req.id, e)
        }
    }
}

fn handle_wizard_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session(state, req) {
        Ok((_, wizard)) => ok(&req.id, json!({ "view": wizard.view() })),
        Err(resp) => resp,
    }
}

fn handle_wizard_finish(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (id, submission, breakdown) = match session(state, req) {
        Ok((id, wizard)) => match wizard.finish() {
            Ok(s) => (id, s, wizard.breakdown()),
            Err(e) => return wizard_err(&req.id, e),
        },
        Err(resp) => return resp,
    };

    // Without a workspace the payload is only handed back to the caller.
    let mut enrollment_id: Option<String> = None;
    if let Some(conn) = state.db.as_ref() {
        let eid = Uuid::new_v4().to_string();
        if let Err(e) = db::enrollment_insert(conn, &eid, &submission, breakdown.total) {
            error!("saving enrollment from wizard {} failed: {:?}", id, e);
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "enrollments" })),
            );
        }
        enrollment_id = Some(eid);
    }

    state.wizards.remove(&id);
    info!(
        "wizard session {} finished: {} siblings, total {}",
        id, submission.siblings, breakdown.formatted_total
    );
    ok(
        &req.id,
        json!({
            "enrollmentId": enrollment_id,
            "submission": submission,
            "breakdown": breakdown
        }),
    )
}

fn handle_wizard_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match param_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if state.wizards.remove(id).is_none() {
        return err(&req.id, "not_found", "wizard session not found", None);
    }
    info!("wizard session {} closed", id);
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "wizard.open" => Some(handle_wizard_open(state, req)),
        "wizard.event" => Some(handle_wizard_event(state, req)),
        "wizard.get" => Some(handle_wizard_get(state, req)),
        "wizard.finish" => Some(handle_wizard_finish(state, req)),
        "wizard.close" => Some(handle_wizard_close(state, req)),
        _ => None,
    }
}
