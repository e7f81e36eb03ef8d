use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Write a config file for one test
fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

/// Run the binary with a config and return (success, stdout, stderr)
async fn run_cli(config_path: Option<&Path>, args: &[&str]) -> (bool, String, String) {
    let mut command = tokio::process::Command::new(env!("CARGO_BIN_EXE_clipforge"));
    command
        .env_remove("CLIPFORGE_CONFIG")
        .env("RUST_LOG", "error")
        .kill_on_drop(true);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    let output = command.args(args).output().await.expect("Failed to run cli");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

#[tokio::test]
async fn test_validate_accepts_valid_config() {
    let config = config_file(
        r#"
[download]
chunk_size = 4096

[transcoder]
log_level = "error"
"#,
    );

    let (ok, stdout, _) = run_cli(Some(config.path()), &["validate"]).await;
    assert!(ok);
    assert!(stdout.contains("Configuration is valid"));
}

#[tokio::test]
async fn test_validate_rejects_invalid_config() {
    let config = config_file(
        r#"
[download]
chunk_size = 0
"#,
    );

    let (ok, _, stderr) = run_cli(Some(config.path()), &["validate"]).await;
    assert!(!ok);
    assert!(stderr.contains("chunk_size"));
}

#[tokio::test]
async fn test_missing_config_file_fails() {
    let (ok, _, stderr) = run_cli(Some(Path::new("/nonexistent/clipforge.toml")), &["validate"]).await;
    assert!(!ok);
    assert!(stderr.contains("not found"));
}

#[tokio::test]
async fn test_transcode_requires_output() {
    let (ok, _, stderr) = run_cli(None, &["transcode", "--input", "/tmp/in.mkv"]).await;
    assert!(!ok);
    assert!(stderr.contains("--output"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_resolve_reports_local_install() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    for tool in ["ffmpeg", "ffprobe"] {
        let path = root.path().join(tool);
        std::fs::write(
            &path,
            format!("#!/bin/sh\necho \"{} version 6.1-local\"\n", tool),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let config = config_file(&format!(
        "[tools]\nlocal_root = \"{}\"\n",
        root.path().display()
    ));

    let (ok, stdout, _) = run_cli(Some(config.path()), &["resolve"]).await;
    assert!(ok);
    assert!(stdout.contains("ffmpeg   6.1-local"));
    assert!(stdout.contains("local"));
}
