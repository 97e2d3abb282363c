mod test_support;

use serde_json::json;
use test_support::{fixture_path, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn catalog_import_from_file_then_edit() {
    let workspace = temp_dir("tuitiond-catalog");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.import",
        json!({ "path": fixture_path("fee_structures.json").to_string_lossy() }),
    );
    assert_eq!(imported.get("imported").and_then(|n| n.as_u64()), Some(3));

    let grades = request_ok(&mut stdin, &mut reader, "3", "catalog.grades", json!({}));
    assert_eq!(grades.get("grades"), Some(&json!(["5", "8", "9"])));

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "catalog.upsert",
        json!({
            "feeStructure": {
                "grades": "10",
                "order": 4,
                "subjects_with_fee": [{ "name": "All", "fee": 18000 }]
            }
        }),
    );
    let new_id = saved.get("id").and_then(|v| v.as_str()).expect("id").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "5", "catalog.list", json!({}));
    let structures = listed
        .get("feeStructures")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("feeStructures");
    assert_eq!(structures.len(), 4);
    assert_eq!(structures[3].get("grades").and_then(|g| g.as_str()), Some("10"));
    assert_eq!(
        structures[1].pointer("/subjects_with_fee/1/name").and_then(|n| n.as_str()),
        Some("Math")
    );

    let _ = request_ok(&mut stdin, &mut reader, "6", "catalog.delete", json!({ "id": new_id }));
    let e = request_err(&mut stdin, &mut reader, "7", "catalog.delete", json!({ "id": new_id }));
    assert_eq!(e.get("code").and_then(|c| c.as_str()), Some("not_found"));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "catalog.upsert",
        json!({
            "feeStructure": {
                "grades": "11",
                "subjects_with_fee": [{ "name": "Math", "fee": -5 }]
            }
        }),
    );
    assert_eq!(e.get("code").and_then(|c| c.as_str()), Some("negative_fee"));
}

#[test]
fn setup_defaults_and_updates_persist() {
    let workspace = temp_dir("tuitiond-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup.pointer("/fees/roundingStep").and_then(|v| v.as_f64()), Some(500.0));
    assert_eq!(setup.pointer("/wizard/maxSiblings").and_then(|v| v.as_u64()), Some(4));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "wizard", "patch": { "maxSiblings": 6 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({
            "section": "fees",
            "patch": { "siblingDiscounts": [{ "count": 2, "percent": 20 }] }
        }),
    );
    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "fees", "patch": { "acChargePerSibling": -1 } }),
    );
    assert_eq!(e.get("code").and_then(|c| c.as_str()), Some("bad_params"));

    let setup = request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));
    assert_eq!(setup.pointer("/wizard/maxSiblings").and_then(|v| v.as_u64()), Some(6));
    assert_eq!(
        setup.pointer("/fees/siblingDiscounts"),
        Some(&json!([{ "count": 2, "percent": 20.0 }]))
    );

    // flat 20% now applies to three siblings as well
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.calculate",
        json!({
            "feeStructures": [
                { "id": "g5", "grades": "5", "subjects_with_fee": [{ "name": "All", "fee": 10000 }] }
            ],
            "details": [
                { "grade": "5", "mode": "On Campus", "subjectType": "all", "subjects": ["All"] },
                { "grade": "5", "mode": "On Campus", "subjectType": "all", "subjects": ["All"] },
                { "grade": "5", "mode": "On Campus", "subjectType": "all", "subjects": ["All"] }
            ]
        }),
    );
    assert_eq!(r.get("total").and_then(|v| v.as_f64()), Some(24000.0));

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "wizard.open",
        json!({}),
    );
    let sid = opened.get("sessionId").and_then(|v| v.as_str()).expect("sessionId");
    let v = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "wizard.event",
        json!({ "sessionId": sid, "event": { "type": "selectSiblings", "count": 6 } }),
    );
    assert_eq!(v.pointer("/view/siblings").and_then(|n| n.as_u64()), Some(6));
}
