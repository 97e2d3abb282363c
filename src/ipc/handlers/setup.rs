use crate::calc::FeeRules;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_db;
use crate::ipc::types::{AppState, Request};
use crate::wizard::DEFAULT_MAX_SIBLINGS;
use log::{info, warn};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Fees,
    Wizard,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "fees" => Some(Self::Fees),
            "wizard" => Some(Self::Wizard),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Fees => "setup.fees",
            Self::Wizard => "setup.wizard",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Fees => serde_json::to_value(FeeRules::default()).unwrap_or(Value::Null),
        SetupSection::Wizard => json!({
            "maxSiblings": DEFAULT_MAX_SIBLINGS
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_non_negative(v: &Value, key: &str) -> Result<f64, String> {
    match v.as_f64() {
        Some(n) if n.is_finite() && n >= 0.0 => Ok(n),
        _ => Err(format!("{} must be a non-negative number", key)),
    }
}

fn parse_percent(v: &Value, key: &str) -> Result<f64, String> {
    match v.as_f64() {
        Some(n) if (0.0..=100.0).contains(&n) => Ok(n),
        _ => Err(format!("{} must be a percentage between 0 and 100", key)),
    }
}

fn parse_int_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    match v.as_i64() {
        Some(n) if n >= min && n <= max => Ok(n),
        _ => Err(format!("{} must be an integer between {} and {}", key, min, max)),
    }
}

fn parse_discount_tiers(v: &Value, key: &str) -> Result<Value, String> {
    let Some(items) = v.as_array() else {
        return Err(format!("{} must be an array of {{count, percent}}", key));
    };
    let mut out = Vec::with_capacity(items.len());
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            return Err(format!("{} entries must be objects", key));
        };
        let count = parse_int_range(
            obj.get("count").unwrap_or(&Value::Null),
            &format!("{}.count", key),
            1,
            100,
        )?;
        let percent = parse_percent(
            obj.get("percent").unwrap_or(&Value::Null),
            &format!("{}.percent", key),
        )?;
        if seen.contains(&count) {
            return Err(format!("{} lists count {} twice", key, count));
        }
        seen.push(count);
        out.push(json!({ "count": count, "percent": percent }));
    }
    Ok(Value::Array(out))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Fees => match k.as_str() {
                "subjectDiscounts" | "siblingDiscounts" => {
                    obj.insert(k.clone(), parse_discount_tiers(v, k)?);
                }
                "maxIndividualSubjects" => {
                    obj.insert(k.clone(), Value::from(parse_int_range(v, k, 1, 50)?));
                }
                "modeMultipliers" => {
                    let Some(patch_modes) = v.as_object() else {
                        return Err("modeMultipliers must be an object".to_string());
                    };
                    let modes = obj
                        .entry(k.clone())
                        .or_insert_with(|| json!({}));
                    let modes = as_object_mut(modes)?;
                    for (mk, mv) in patch_modes {
                        match mk.as_str() {
                            "onCampus" | "online" | "homeTuition" => {
                                let n = parse_non_negative(mv, &format!("modeMultipliers.{}", mk))?;
                                modes.insert(mk.clone(), Value::from(n));
                            }
                            _ => return Err(format!("unknown study mode multiplier: {}", mk)),
                        }
                    }
                }
                "roundingStep" => {
                    let n = parse_non_negative(v, k)?;
                    if n == 0.0 {
                        return Err("roundingStep must be greater than 0".to_string());
                    }
                    obj.insert(k.clone(), Value::from(n));
                }
                "acChargePerSibling" => {
                    obj.insert(k.clone(), Value::from(parse_non_negative(v, k)?));
                }
                "deservingDiscountPercent" => {
                    obj.insert(k.clone(), Value::from(parse_percent(v, k)?));
                }
                _ => return Err(format!("unknown fees field: {}", k)),
            },
            SetupSection::Wizard => match k.as_str() {
                "maxSiblings" => {
                    obj.insert(k.clone(), Value::from(parse_int_range(v, k, 1, 10)?));
                }
                _ => return Err(format!("unknown wizard field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block loading.
            let mut merged = current.clone();
            match merge_section_patch(section, &mut merged, saved_obj) {
                Ok(()) => current = merged,
                Err(msg) => warn!("ignoring saved {}: {}", section.key(), msg),
            }
        }
    }
    Ok(current)
}

/// Effective pricing rules for the workspace; defaults when none is open.
pub fn load_fee_rules(conn: Option<&rusqlite::Connection>) -> anyhow::Result<FeeRules> {
    let Some(conn) = conn else {
        return Ok(FeeRules::default());
    };
    let v = load_section(conn, SetupSection::Fees)?;
    Ok(serde_json::from_value(v)?)
}

pub fn load_max_siblings(conn: Option<&rusqlite::Connection>) -> anyhow::Result<usize> {
    let Some(conn) = conn else {
        return Ok(DEFAULT_MAX_SIBLINGS);
    };
    let v = load_section(conn, SetupSection::Wizard)?;
    Ok(v.get("maxSiblings")
        .and_then(|n| n.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_MAX_SIBLINGS))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let fees = match load_section(conn, SetupSection::Fees) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let wizard = match load_section(conn, SetupSection::Wizard) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "fees": fees, "wizard": wizard }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!("{} updated", section.key());
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_defaults_deserialize_back_into_rules() {
        let v = default_section(SetupSection::Fees);
        let rules: FeeRules = serde_json::from_value(v).expect("rules");
        assert_eq!(rules, FeeRules::default());
    }

    #[test]
    fn patch_validates_and_merges_mode_multipliers() {
        let mut current = default_section(SetupSection::Fees);
        let patch = json!({ "modeMultipliers": { "online": 1.5 }, "roundingStep": 100 });
        merge_section_patch(
            SetupSection::Fees,
            &mut current,
            patch.as_object().expect("object"),
        )
        .expect("merge");
        let rules: FeeRules = serde_json::from_value(current).expect("rules");
        assert_eq!(rules.mode_multipliers.online, 1.5);
        assert_eq!(rules.mode_multipliers.home_tuition, 3.0);
        assert_eq!(rules.rounding_step, 100.0);
    }

    #[test]
    fn patch_rejects_bad_values() {
        let bad = [
            json!({ "deservingDiscountPercent": 120 }),
            json!({ "roundingStep": 0 }),
            json!({ "siblingDiscounts": [{ "count": 2, "percent": 10 }, { "count": 2, "percent": 20 }] }),
            json!({ "modeMultipliers": { "drone": 4 } }),
            json!({ "surprise": true }),
        ];
        for patch in bad {
            let mut current = default_section(SetupSection::Fees);
            assert!(
                merge_section_patch(
                    SetupSection::Fees,
                    &mut current,
                    patch.as_object().expect("object")
                )
                .is_err(),
                "accepted {}",
                patch
            );
        }
    }
}
