//! Filter plugin integration tests
//!
//! These tests spawn the `ct_monitor_test_filter` helper binary through small
//! shell wrappers and drive it over the real stdio protocol.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use ct_monitor::certspotter::Issuance;
use ct_monitor::error::CtMonitorError;
use ct_monitor::filter::{FilterChain, IssuanceFilter, PluginFilter};

const TIMEOUT: Duration = Duration::from_secs(10);

fn issuances(ids: &[u64]) -> Vec<Issuance> {
    ids.iter()
        .map(|id| {
            serde_json::from_value(common::issuance_json(*id, &["www.example.com"]))
                .expect("valid issuance")
        })
        .collect()
}

fn ids(issuances: &[Issuance]) -> Vec<u64> {
    issuances.iter().map(|i| i.id).collect()
}

fn filter_error(err: &anyhow::Error) -> Option<&CtMonitorError> {
    err.downcast_ref::<CtMonitorError>()
}

#[tokio::test]
async fn test_passthrough_plugin_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let path = common::filter_wrapper(dir.path(), "passthrough.sh", "passthrough");

    let filter = PluginFilter::new(&path, TIMEOUT);
    let out = filter.filter(issuances(&[10, 11, 12])).await.unwrap();
    assert_eq!(ids(&out), vec![10, 11, 12]);
}

#[tokio::test]
async fn test_plugin_preserves_record_fields() {
    let dir = TempDir::new().unwrap();
    let path = common::filter_wrapper(dir.path(), "first.sh", "first");

    let input = issuances(&[10, 11]);
    let expected = input[0].clone();
    let out = PluginFilter::new(&path, TIMEOUT).filter(input).await.unwrap();
    assert_eq!(out, vec![expected]);
}

#[tokio::test]
async fn test_plugin_receives_empty_list() {
    let dir = TempDir::new().unwrap();
    let path = common::filter_wrapper(dir.path(), "last.sh", "last");

    let out = PluginFilter::new(&path, TIMEOUT)
        .filter(Vec::new())
        .await
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_chain_applies_filters_in_order() {
    let dir = TempDir::new().unwrap();
    let keep_last = common::filter_wrapper(dir.path(), "last.sh", "last");
    let keep_12 = common::filter_wrapper(dir.path(), "keep12.sh", "keep-id 12");

    let chain = FilterChain::from_paths(&[keep_last, keep_12], TIMEOUT);
    let result = chain.apply(issuances(&[10, 11, 12])).await;
    assert!(result.is_complete());
    assert_eq!(ids(&result.issuances), vec![12]);

    // Order matters: `first` drops 12 before `keep-id 12` sees it
    let dir2 = TempDir::new().unwrap();
    let keep_first = common::filter_wrapper(dir2.path(), "first.sh", "first");
    let keep_12 = common::filter_wrapper(dir2.path(), "keep12.sh", "keep-id 12");
    let chain = FilterChain::from_paths(&[keep_first, keep_12], TIMEOUT);
    let result = chain.apply(issuances(&[10, 11, 12])).await;
    assert!(result.is_complete());
    assert!(result.issuances.is_empty());
}

#[tokio::test]
async fn test_chain_stops_at_missing_binary_with_partial_output() {
    let dir = TempDir::new().unwrap();
    let first = common::filter_wrapper(dir.path(), "first.sh", "first");
    let missing = dir.path().join("does-not-exist");

    let chain = FilterChain::from_paths(&[first, missing], TIMEOUT);
    let result = chain.apply(issuances(&[10, 11])).await;

    assert_eq!(ids(&result.issuances), vec![10]);
    let failure = result.failure.expect("chain should have failed");
    assert_eq!(failure.step, 1);
    assert!(matches!(
        filter_error(&failure.error),
        Some(CtMonitorError::FilterSpawn(_))
    ));
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = common::write_script(dir.path(), "old.sh", "echo '2|1|stdio|jsonrpc'\ncat > /dev/null");

    let err = PluginFilter::new(&path, TIMEOUT)
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    assert!(matches!(
        filter_error(&err),
        Some(CtMonitorError::FilterHandshake(_))
    ));
}

#[tokio::test]
async fn test_handshake_wrong_network() {
    let dir = TempDir::new().unwrap();
    let path = common::write_script(dir.path(), "tcp.sh", "echo '1|1|tcp|jsonrpc'");

    let err = PluginFilter::new(&path, TIMEOUT)
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    assert!(matches!(
        filter_error(&err),
        Some(CtMonitorError::FilterHandshake(_))
    ));
}

#[tokio::test]
async fn test_silent_plugin_times_out() {
    let dir = TempDir::new().unwrap();
    let path = common::write_script(dir.path(), "silent.sh", "exec sleep 30");

    let started = std::time::Instant::now();
    let err = PluginFilter::new(&path, Duration::from_secs(1))
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    assert!(matches!(
        filter_error(&err),
        Some(CtMonitorError::FilterTimeout { timeout, .. }) if *timeout == Duration::from_secs(1)
    ));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_plugin_exiting_before_handshake() {
    let dir = TempDir::new().unwrap();
    let path = common::write_script(dir.path(), "exit.sh", "exit 0");

    let err = PluginFilter::new(&path, TIMEOUT)
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    assert!(matches!(
        filter_error(&err),
        Some(CtMonitorError::FilterHandshake(_))
    ));
}

#[tokio::test]
async fn test_failing_plugin_reports_rpc_error() {
    let dir = TempDir::new().unwrap();
    let path = common::filter_wrapper(dir.path(), "fail.sh", "fail");

    let err = PluginFilter::new(&path, TIMEOUT)
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    match filter_error(&err) {
        Some(CtMonitorError::FilterRpc(message)) => {
            assert!(message.contains("test filter configured to fail"));
        }
        other => panic!("expected FilterRpc, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chain_of_plugin_and_failure_keeps_first_output() {
    let dir = TempDir::new().unwrap();
    let last = common::filter_wrapper(dir.path(), "last.sh", "last");
    let fail = common::filter_wrapper(dir.path(), "fail.sh", "fail");

    let filters: Vec<Arc<dyn IssuanceFilter>> = vec![
        Arc::new(PluginFilter::new(&last, TIMEOUT)),
        Arc::new(PluginFilter::new(&fail, TIMEOUT)),
    ];
    let result = FilterChain::new(filters).apply(issuances(&[10, 11, 12])).await;

    assert_eq!(ids(&result.issuances), vec![12]);
    let failure = result.failure.expect("second step fails");
    assert_eq!(failure.step, 1);
    assert!(failure.to_string().contains("step 2"));
}

#[test]
fn test_plugin_refuses_to_run_without_cookie() {
    Command::new(common::test_filter_exe())
        .env_remove("CT_MONITOR_PLUGIN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("filter plugin"));
}

#[test]
fn test_plugin_handshake_and_call_over_stdio() {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "Plugin.Filter",
        "params": [common::issuance_json(10, &["a.example.com"]), common::issuance_json(11, &["b.example.com"])]
    });

    let output = Command::new(common::test_filter_exe())
        .arg("keep-id")
        .arg("11")
        .env("CT_MONITOR_PLUGIN", "issuance_filter")
        .write_stdin(format!("{}\n", request))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("1|1|stdio|jsonrpc"));

    let response: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(response["id"], 7);
    let result = response["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["id"], "11");
}

fn is_alive(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks that the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

fn read_pid(path: &std::path::Path) -> libc::pid_t {
    std::fs::read_to_string(path)
        .expect("plugin wrote its pid")
        .trim()
        .parse()
        .expect("pid is numeric")
}

#[tokio::test]
async fn test_plugin_process_is_reaped_after_success() {
    let dir = TempDir::new().unwrap();
    let pidfile = dir.path().join("answer.pid");
    let path = common::write_script(
        dir.path(),
        "answer.sh",
        &format!(
            "echo $$ > \"{}\"\necho '1|1|stdio|jsonrpc'\nread -r request\necho '{{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":[]}}'\nexec sleep 30",
            pidfile.display()
        ),
    );

    let out = PluginFilter::new(&path, TIMEOUT)
        .filter(issuances(&[10, 11]))
        .await
        .unwrap();
    assert!(out.is_empty());

    let pid = read_pid(&pidfile);
    assert!(!is_alive(pid), "plugin {} still running after a successful call", pid);
}

#[tokio::test]
async fn test_plugin_process_is_reaped_after_timeout() {
    let dir = TempDir::new().unwrap();
    let pidfile = dir.path().join("silent.pid");
    let path = common::write_script(
        dir.path(),
        "silent.sh",
        &format!("echo $$ > \"{}\"\nexec sleep 30", pidfile.display()),
    );

    let err = PluginFilter::new(&path, Duration::from_secs(1))
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    assert!(matches!(
        filter_error(&err),
        Some(CtMonitorError::FilterTimeout { .. })
    ));

    let pid = read_pid(&pidfile);
    assert!(!is_alive(pid), "plugin {} still running after a timeout", pid);
}

#[tokio::test]
async fn test_sub_second_timeout_is_reported_precisely() {
    let dir = TempDir::new().unwrap();
    let path = common::write_script(dir.path(), "slow.sh", "exec sleep 30");

    let err = PluginFilter::new(&path, Duration::from_millis(500))
        .filter(issuances(&[10]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("within 500ms"));
}
