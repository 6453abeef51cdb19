//! CLI integration tests

use serde_json::{json, Value};
use std::io::Write;
use std::process::Command;

fn scanner() -> Command {
    Command::new(env!("CARGO_BIN_EXE_waste-scanner"))
}

fn inventory_file() -> tempfile::NamedTempFile {
    let created = (chrono::Utc::now() - chrono::Duration::days(120)).to_rfc3339();
    let snapshot = json!({
        "resources": {
            "volume": [
                {"VolumeId": "vol-1", "VolumeType": "gp3", "Size": 200, "CreateTime": created}
            ],
            "nat-gateway": [
                {"NatGatewayId": "nat-1", "VpcId": "vpc-1", "State": "available", "CreateTime": created}
            ]
        }
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(snapshot.to_string().as_bytes()).unwrap();
    file
}

/// Test that the scanner lists its pipelines
#[test]
fn test_list_pipelines() {
    let output = scanner()
        .arg("--list")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "--list should succeed");
    assert!(stdout.contains("ebs-unused"), "Should list ebs-unused");
    assert!(stdout.contains("logs-never-expire"), "Should list logs-never-expire");
}

/// Test that a scan requires an inventory
#[test]
fn test_inventory_required() {
    let output = scanner().output().expect("Failed to execute command");
    assert!(!output.status.success(), "Scan without inventory should fail");
}

/// Test a scan of two pipelines writing reports and metrics
#[test]
fn test_scan_writes_reports() {
    let inventory = inventory_file();
    let out = tempfile::tempdir().unwrap();
    let metrics = out.path().join("scanner.prom");

    let output = scanner()
        .arg("--inventory")
        .arg(inventory.path())
        .args(["--pipeline", "ebs-unused", "--pipeline", "nat-unused"])
        .arg("--output-dir")
        .arg(out.path())
        .arg("--metrics-file")
        .arg(&metrics)
        .args(["--format", "json"])
        .output()
        .expect("Failed to execute command");

    assert!(
        output.status.success(),
        "Scan should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("ebs-unused.json")).unwrap())
            .unwrap();
    assert_eq!(report["rows"][0]["ID"], json!("vol-1"));
    assert!(out.path().join("nat-unused.json").exists());
    assert!(!out.path().join("eip-unused.json").exists());

    let exposition = std::fs::read_to_string(&metrics).unwrap();
    assert!(exposition.contains("waste_scanner_resources_flagged_total"));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"pipeline\": \"ebs-unused\""));
}

/// Test that an unknown pipeline name is rejected
#[test]
fn test_unknown_pipeline_rejected() {
    let inventory = inventory_file();
    let out = tempfile::tempdir().unwrap();

    let output = scanner()
        .arg("--inventory")
        .arg(inventory.path())
        .args(["--pipeline", "lambda-unused"])
        .arg("--output-dir")
        .arg(out.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unknown pipeline should fail");
}
