mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, spawn_sidecar};

#[test]
fn health_and_unknown_method() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let e = request_err(&mut stdin, &mut reader, "2", "grid.get", json!({}));
    assert_eq!(e.get("code").and_then(|v| v.as_str()), Some("not_implemented"));
}

#[test]
fn bad_json_line_gets_error_and_loop_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("parse");
    assert_eq!(v.pointer("/error/code").and_then(|c| c.as_str()), Some("bad_json"));

    let resp = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn workspace_methods_require_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let e = request_err(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(e.get("code").and_then(|v| v.as_str()), Some("no_workspace"));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "fees.calculate",
        json!({ "details": [] }),
    );
    assert_eq!(e.get("code").and_then(|v| v.as_str()), Some("no_workspace"));

    let listed = request_ok(&mut stdin, &mut reader, "3", "catalog.list", json!({}));
    assert_eq!(listed.get("feeStructures"), Some(&json!([])));
}
