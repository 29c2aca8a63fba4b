// CLI integration tests: output contract and exit codes, no live cluster required.
use std::net::TcpListener;
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_aerostep");
    let mut command = Command::new(exe);
    command.env_remove("RUST_LOG");
    command
}

fn parse_json_line(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with('{'))
        .expect("json line");
    serde_json::from_str(line).expect("valid json")
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

#[test]
fn provider_info_prints_metadata() {
    let output = cmd().arg("provider-info").output().expect("provider-info");
    assert!(output.status.success());
    let value = parse_json_line(&output.stdout);
    assert_eq!(value["provider"]["conn_type"], "aerospike");
    assert_eq!(value["provider"]["package_name"], "aerostep");
    assert_eq!(value["field_behaviour"]["placeholders"]["port"], "3000");
}

#[test]
fn missing_env_profile_is_connection_error_with_cause() {
    let output = cmd()
        .env_remove("AEROSTEP_CONN_NOT_CONFIGURED")
        .args(["--conn-id", "not-configured", "get", "test", "demo", "k1"])
        .output()
        .expect("get");
    assert_eq!(output.status.code(), Some(4));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Connection");
    let causes = err["error"]["causes"].as_array().expect("causes");
    assert!(
        causes
            .iter()
            .any(|cause| cause.as_str().unwrap_or_default().contains("not-configured"))
    );
}

#[test]
fn test_connection_reports_failure_as_json() {
    let port = unused_port().to_string();
    let output = cmd()
        .args([
            "--host",
            "127.0.0.1",
            "--port",
            &port,
            "--timeout-ms",
            "500",
            "test-connection",
        ])
        .output()
        .expect("test-connection");
    assert_eq!(output.status.code(), Some(4));
    let value = parse_json_line(&output.stdout);
    assert_eq!(value["success"], false);
    let message = value["message"].as_str().expect("message");
    assert!(message.starts_with(&format!("failed to connect to 127.0.0.1:{port}")));
}

#[test]
fn invalid_bins_json_is_usage_error() {
    let output = cmd()
        .args([
            "--host",
            "127.0.0.1",
            "put",
            "test",
            "demo",
            "k1",
            "--bins",
            "[1, 2]",
        ])
        .output()
        .expect("put");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert_eq!(err["error"]["message"], "--bins must be a JSON object");
}

#[test]
fn port_requires_host() {
    let output = cmd()
        .args(["--port", "3000", "test-connection"])
        .output()
        .expect("test-connection");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}
