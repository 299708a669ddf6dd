/// Integration tests for the disk cache CLI shell.
/// Spawns the built binary and drives it over stdin/stdout, the same way a
/// user would at a terminal.
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn run_cli_command(cache_dir: &Path, max_size: &str, command: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new("cargo")
        .args(["run", "-p", "cli", "--"])
        .env("DISK_CACHE_DIR", cache_dir.to_str().unwrap())
        .env("DISK_CACHE_APP_VERSION", "1")
        .env("DISK_CACHE_CACHE_VERSION", "1")
        .env("DISK_CACHE_MAX_SIZE_BYTES", max_size)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cli");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin.write_all(command.as_bytes()).expect("failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("failed to write EXIT");
    }

    let output = child.wait_with_output().expect("failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn edit_write_commit_then_get_roundtrips_a_value() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let output = run_cli_command(
        &cache_dir,
        "1048576",
        "EDIT greeting\nWRITE hello there\nCOMMIT\nGET greeting\n",
    );

    assert!(output.contains("OK"));
    assert!(output.contains("hello there"));
}

#[test]
fn second_edit_while_one_is_open_is_rejected() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let output = run_cli_command(&cache_dir, "1048576", "EDIT a\nEDIT b\n");
    assert!(output.contains("ERR an editor is already open"));
}

#[test]
fn abort_discards_the_write_and_frees_the_key() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let output = run_cli_command(
        &cache_dir,
        "1048576",
        "EDIT a\nWRITE partial\nABORT\nGET a\nEDIT a\n",
    );
    assert!(output.contains("(nil)"));
    // key is free again after abort
    assert!(!output.contains("ERR an editor is already open"));
}

#[test]
fn remove_then_get_reports_not_found() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let output = run_cli_command(
        &cache_dir,
        "1048576",
        "EDIT a\nWRITE value\nCOMMIT\nREMOVE a\nGET a\n",
    );
    assert!(output.contains("(nil)"));
}

#[test]
fn stats_reports_size_and_entry_count_after_a_commit() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let output = run_cli_command(&cache_dir, "1048576", "EDIT a\nWRITE hi\nCOMMIT\nSTATS\n");
    assert!(output.contains("entries=1"));
}

#[test]
fn committed_values_survive_a_restart() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    run_cli_command(&cache_dir, "1048576", "EDIT a\nWRITE durable\nCOMMIT\nCLOSE\n");
    let output = run_cli_command(&cache_dir, "1048576", "GET a\n");
    assert!(output.contains("durable"));
}
