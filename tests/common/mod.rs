use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Path to the `ct_monitor_test_filter` plugin binary.
#[allow(dead_code)]
pub fn test_filter_exe() -> PathBuf {
    if let Some(p) = option_env!("CARGO_BIN_EXE_ct_monitor_test_filter") {
        return PathBuf::from(p);
    }
    if let Ok(manifest) = std::env::var("CARGO_MANIFEST_DIR") {
        let debug = PathBuf::from(manifest)
            .join("target")
            .join("debug")
            .join("ct_monitor_test_filter");
        if debug.exists() {
            return debug;
        }
    }
    PathBuf::from("ct_monitor_test_filter")
}

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
#[allow(dead_code)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("failed to write script");
    let mut perms = fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Wrap the test filter binary so it runs with `args`.
#[cfg(unix)]
#[allow(dead_code)]
pub fn filter_wrapper(dir: &Path, name: &str, args: &str) -> PathBuf {
    write_script(
        dir,
        name,
        &format!("exec \"{}\" {}", test_filter_exe().display(), args),
    )
}

/// Minimal upstream JSON for one issuance.
#[allow(dead_code)]
pub fn issuance_json(id: u64, names: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "id": id.to_string(),
        "tbs_sha256": format!("{:064x}", id),
        "cert_sha256": format!("{:064x}", id + 1000),
        "dns_names": names,
        "pubkey_sha256": format!("{:064x}", id + 2000),
        "issuer": {
            "name": "C=US, O=Let's Encrypt, CN=R3",
            "friendly_name": "Let's Encrypt",
            "pubkey_sha256": "8d02536c887482bc34ff54e41d2ba659bf85b341a0a20afadb5813dcfbcf286d"
        },
        "not_before": "2024-05-01T00:00:00Z",
        "not_after": "2024-07-30T00:00:00Z",
        "cert": {"type": "cert", "sha256": format!("{:064x}", id + 1000), "data": ""}
    })
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
