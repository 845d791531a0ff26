//! Integration tests for the `tp` CLI.
//!
//! Each test runs `tp` as a subprocess inside a temp directory (so the
//! default `.taskpad` data dir lands there) and checks stdout and the
//! files written.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pretty_assertions::assert_eq;

/// Get the path to the built `tp` binary.
fn tp_bin() -> PathBuf {
    // cargo test builds to target/debug/
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tp");
    path
}

/// Run `tp` with the given args in the given directory, returning (stdout, stderr, success).
fn run_tp(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(tp_bin())
        .args(args)
        .current_dir(dir)
        .env_remove("TASKPAD_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tp");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `tp` expecting success, return stdout.
fn run_tp_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tp(dir, args);
    if !success {
        panic!("tp {:?} failed:\nstdout: {}\nstderr: {}", args, stdout, stderr);
    }
    stdout
}

/// Run `tp` expecting failure, return stderr.
fn run_tp_err(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tp(dir, args);
    if success {
        panic!("tp {:?} unexpectedly succeeded:\nstdout: {}", args, stdout);
    }
    stderr
}

/// Add a task and return its id.
fn add(dir: &Path, args: &[&str]) -> String {
    let mut full = vec!["add"];
    full.extend_from_slice(args);
    run_tp_ok(dir, &full).trim().to_string()
}

fn list_json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["list", "--json"];
    full.extend_from_slice(args);
    serde_json::from_str(&run_tp_ok(dir, &full)).unwrap()
}

fn titles(list: &serde_json::Value) -> Vec<String> {
    list["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_string())
        .collect()
}

fn stored_tasks(dir: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(dir.join(".taskpad/taskpad.tasks.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ---------------------------------------------------------------------------
// Adding and listing
// ---------------------------------------------------------------------------

#[test]
fn test_add_persists_and_prints_id() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = add(tmp.path(), &["Buy milk", "-p", "high", "--notes", "2 litres"]);
    assert_eq!(id.len(), 32);

    let stored = stored_tasks(tmp.path());
    assert_eq!(stored[0]["id"], id.as_str());
    assert_eq!(stored[0]["title"], "Buy milk");
    assert_eq!(stored[0]["priority"], "high");
    assert_eq!(stored[0]["notes"], "2 litres");
    assert_eq!(stored[0]["completed"], false);

    let version = fs::read_to_string(tmp.path().join(".taskpad/taskpad.version.json")).unwrap();
    assert_eq!(version, "1.0.0");
}

#[test]
fn test_add_blank_title_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let err = run_tp_err(tmp.path(), &["add", "   "]);
    assert!(err.contains("title is empty"));
    assert!(!tmp.path().join(".taskpad/taskpad.tasks.json").exists());
}

#[test]
fn test_add_unknown_priority_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let err = run_tp_err(tmp.path(), &["add", "x", "-p", "urgent"]);
    assert!(err.contains("unknown priority"));
}

#[test]
fn test_list_sorts_by_priority_and_completion() {
    let tmp = tempfile::TempDir::new().unwrap();
    add(tmp.path(), &["Low one", "-p", "low"]);
    let high = add(tmp.path(), &["High one", "-p", "high"]);
    add(tmp.path(), &["Medium one"]);
    run_tp_ok(tmp.path(), &["toggle", &high]);

    let list = list_json(tmp.path(), &[]);
    assert_eq!(titles(&list), vec!["Medium one", "Low one", "High one"]);
    assert_eq!(list["filter"], "all");
    assert_eq!(list["sort"], "priority");
}

#[test]
fn test_list_filter_and_search() {
    let tmp = tempfile::TempDir::new().unwrap();
    let milk = add(tmp.path(), &["Buy milk"]);
    add(tmp.path(), &["Buy bread"]);
    add(tmp.path(), &["Call plumber", "-d", "The kitchen sink leaks"]);
    run_tp_ok(tmp.path(), &["done", &milk]);

    let active = list_json(tmp.path(), &["--filter", "active"]);
    assert_eq!(titles(&active).len(), 2);

    let done = list_json(tmp.path(), &["--filter", "done"]);
    assert_eq!(titles(&done), vec!["Buy milk"]);

    let searched = list_json(tmp.path(), &["--search", "SINK"]);
    assert_eq!(titles(&searched), vec!["Call plumber"]);
    assert_eq!(searched["tasks"][0]["matched"], serde_json::json!(["description"]));

    let none = list_json(tmp.path(), &["--filter", "done", "--search", "bread"]);
    assert!(titles(&none).is_empty());
}

#[test]
fn test_list_save_remembers_view() {
    let tmp = tempfile::TempDir::new().unwrap();
    let milk = add(tmp.path(), &["Buy milk"]);
    add(tmp.path(), &["Buy bread"]);
    run_tp_ok(tmp.path(), &["toggle", &milk]);

    run_tp_ok(tmp.path(), &["list", "--filter", "done", "--save"]);
    let list = list_json(tmp.path(), &[]);
    assert_eq!(list["filter"], "done");
    assert_eq!(titles(&list), vec!["Buy milk"]);

    let state = fs::read_to_string(tmp.path().join(".taskpad/taskpad.state.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&state).unwrap();
    assert_eq!(state["filter"], "done");
    assert_eq!(state["sortBy"], "priority");
}

#[test]
fn test_list_text_output() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = add(tmp.path(), &["Water plants", "-p", "low"]);
    let out = run_tp_ok(tmp.path(), &["list"]);
    assert_eq!(out, format!("[ ] {} low    Water plants\n", &id[..8]));
}

#[test]
fn test_list_empty_dir() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = run_tp_ok(tmp.path(), &["list"]);
    assert_eq!(out, "");
    assert!(!tmp.path().join(".taskpad").exists());
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

#[test]
fn test_show_accepts_prefix() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = add(tmp.path(), &["Write report", "--subtitle", "Q2"]);

    let out = run_tp_ok(tmp.path(), &["show", &id[..6]]);
    assert!(out.starts_with("[ ] Write report\n    Q2\n"));
    assert!(out.contains(&format!("id: {}", id)));

    let json: serde_json::Value =
        serde_json::from_str(&run_tp_ok(tmp.path(), &["show", &id, "--json"])).unwrap();
    assert_eq!(json["subtitle"], "Q2");
}

#[test]
fn test_unknown_id_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    add(tmp.path(), &["Something"]);
    let err = run_tp_err(tmp.path(), &["toggle", "zzzz"]);
    assert!(err.contains("task not found: zzzz"));
}

#[test]
fn test_edit_fields_and_clear() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = add(tmp.path(), &["Draft", "--notes", "old notes"]);

    run_tp_ok(
        tmp.path(),
        &["edit", &id, "--title", "  Final  ", "--notes", "", "-p", "high"],
    );
    let stored = stored_tasks(tmp.path());
    assert_eq!(stored[0]["title"], "Final");
    assert_eq!(stored[0]["priority"], "high");
    assert!(stored[0].get("notes").is_none());
    assert!(stored[0]["updatedAt"].is_string());

    let err = run_tp_err(tmp.path(), &["edit", &id, "--title", " "]);
    assert!(err.contains("title is empty"));
    assert_eq!(stored_tasks(tmp.path())[0]["title"], "Final");

    let err = run_tp_err(tmp.path(), &["edit", &id]);
    assert!(err.contains("nothing to change"));
}

#[test]
fn test_rm_and_mv() {
    let tmp = tempfile::TempDir::new().unwrap();
    let a = add(tmp.path(), &["A"]);
    add(tmp.path(), &["B"]);
    add(tmp.path(), &["C"]);
    // stored order is newest first: C, B, A

    run_tp_ok(tmp.path(), &["mv", "0", "2"]);
    let order: Vec<String> = stored_tasks(tmp.path())
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(order, vec!["B", "A", "C"]);

    let err = run_tp_err(tmp.path(), &["mv", "0", "5"]);
    assert!(err.contains("out of range"));

    run_tp_ok(tmp.path(), &["rm", &a]);
    assert_eq!(stored_tasks(tmp.path()).as_array().unwrap().len(), 2);

    let stored_listing = run_tp_ok(tmp.path(), &["list", "--stored"]);
    assert!(stored_listing.starts_with("0  [ ] "));
    assert!(stored_listing.contains(" B"));
}

// ---------------------------------------------------------------------------
// Subtasks and bulk operations
// ---------------------------------------------------------------------------

#[test]
fn test_subtask_lifecycle() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = add(tmp.path(), &["Plan trip"]);

    let sub = run_tp_ok(tmp.path(), &["sub", "add", &id, "Book flights"]);
    let sub = sub.trim();
    run_tp_ok(tmp.path(), &["sub", "add", &id, "Pack"]);
    run_tp_ok(tmp.path(), &["sub", "toggle", &id, &sub[..6]]);
    run_tp_ok(tmp.path(), &["sub", "edit", &id, sub, "Book cheap flights"]);

    let stored = stored_tasks(tmp.path());
    let subs = stored[0]["subtasks"].as_array().unwrap();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0]["title"], "Book cheap flights");
    assert_eq!(subs[0]["completed"], true);

    let line = run_tp_ok(tmp.path(), &["list"]);
    assert!(line.trim_end().ends_with("(1/2)"));

    run_tp_ok(tmp.path(), &["sub", "rm", &id, sub]);
    assert_eq!(stored_tasks(tmp.path())[0]["subtasks"].as_array().unwrap().len(), 1);

    let err = run_tp_err(tmp.path(), &["sub", "add", &id, "  "]);
    assert!(err.contains("title is empty"));
}

#[test]
fn test_done_undone_and_clear_done() {
    let tmp = tempfile::TempDir::new().unwrap();
    let a = add(tmp.path(), &["A"]);
    let b = add(tmp.path(), &["B"]);
    add(tmp.path(), &["C"]);

    let out = run_tp_ok(tmp.path(), &["done", &a, &b]);
    assert_eq!(out, "completed 2 tasks\n");
    let out = run_tp_ok(tmp.path(), &["done", &a]);
    assert_eq!(out, "completed 0 tasks\n");

    let out = run_tp_ok(tmp.path(), &["undone", &b, "--json"]);
    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(json["changed"], 1);

    let out = run_tp_ok(tmp.path(), &["clear-done"]);
    assert_eq!(out, "removed 1 task\n");
    let list = list_json(tmp.path(), &[]);
    assert_eq!(titles(&list), vec!["C", "B"]);
}

#[test]
fn test_stats() {
    let tmp = tempfile::TempDir::new().unwrap();
    let a = add(tmp.path(), &["A"]);
    add(tmp.path(), &["B"]);
    run_tp_ok(tmp.path(), &["toggle", &a]);

    let json: serde_json::Value =
        serde_json::from_str(&run_tp_ok(tmp.path(), &["stats", "--json"])).unwrap();
    assert_eq!(json["total"], 2);
    assert_eq!(json["active"], 1);
    assert_eq!(json["completed"], 1);
    assert_eq!(json["storage"]["available"], true);
    assert!(json["storage"]["tasksSize"].as_u64().unwrap() > 0);

    let out = run_tp_ok(tmp.path(), &["stats"]);
    assert!(out.starts_with("2 tasks: 1 active, 1 done\n"));
}

// ---------------------------------------------------------------------------
// Backup, recovery and configuration
// ---------------------------------------------------------------------------

#[test]
fn test_export_import_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let a = add(tmp.path(), &["Alpha", "-p", "high"]);
    add(tmp.path(), &["Beta"]);
    run_tp_ok(tmp.path(), &["toggle", &a]);
    let before = stored_tasks(tmp.path());

    run_tp_ok(tmp.path(), &["export", "backup.json"]);
    let backup: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("backup.json")).unwrap()).unwrap();
    assert_eq!(backup["version"], "1.0.0");
    assert!(backup["exportDate"].is_string());

    run_tp_ok(tmp.path(), &["-C", "other", "import", "backup.json"]);
    let other = fs::read_to_string(tmp.path().join("other/taskpad.tasks.json")).unwrap();
    let other: serde_json::Value = serde_json::from_str(&other).unwrap();
    assert_eq!(other, before);
}

#[test]
fn test_import_rejects_non_backup() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(tmp.path().join("bad.json"), r#"{"items": []}"#).unwrap();
    let err = run_tp_err(tmp.path(), &["import", "bad.json"]);
    assert!(err.contains("no tasks array"));
}

#[test]
fn test_corrupt_storage_is_recovered() {
    let tmp = tempfile::TempDir::new().unwrap();
    let data = tmp.path().join(".taskpad");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("taskpad.tasks.json"), "{ invalid json }").unwrap();

    let out = run_tp_ok(tmp.path(), &["list"]);
    assert_eq!(out, "");
    assert!(!data.join("taskpad.tasks.json").exists());

    let log = run_tp_ok(tmp.path(), &["recovery"]);
    assert!(log.contains("parse"));
    assert!(log.contains("| { invalid json }"));

    let json: serde_json::Value =
        serde_json::from_str(&run_tp_ok(tmp.path(), &["recovery", "--json"])).unwrap();
    assert_eq!(json[0]["category"], "parse");

    let out = run_tp_ok(tmp.path(), &["recovery", "prune", "--all"]);
    assert_eq!(out, "removed 1 recovery entries\n");
    assert_eq!(run_tp_ok(tmp.path(), &["recovery"]), "recovery log is empty\n");
}

#[test]
fn test_recovery_path() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = run_tp_ok(tmp.path(), &["-C", ".", "recovery", "path"]);
    assert!(out.trim().ends_with(".recovery.log"));
}

#[test]
fn test_config_prefix_and_default_priority() {
    let tmp = tempfile::TempDir::new().unwrap();
    let data = tmp.path().join("work");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join("taskpad.toml"),
        "[storage]\nkey_prefix = \"work\"\n\n[defaults]\npriority = \"low\"\n",
    )
    .unwrap();

    add(tmp.path(), &["-C", "work", "Expense report"]);
    let raw = fs::read_to_string(data.join("work.tasks.json")).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored[0]["priority"], "low");
}

#[test]
fn test_invalid_config_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let data = tmp.path().join(".taskpad");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("taskpad.toml"), "[undo\nlimit = ").unwrap();

    let err = run_tp_err(tmp.path(), &["list"]);
    assert!(err.starts_with("error: could not parse"));
}

#[test]
fn test_data_dir_from_env() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = Command::new(tp_bin())
        .args(["add", "From env"])
        .current_dir(tmp.path())
        .env("TASKPAD_DIR", tmp.path().join("envdir"))
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(tmp.path().join("envdir/taskpad.tasks.json").exists());
}
