use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn chunkplan(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chunkplan").unwrap();
    cmd.current_dir(dir).env_remove("CHUNKPLAN_MODE").env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &Path) {
    chunkplan(dir).arg("init").assert().success();
    assert!(dir.join("chunkplan.toml").exists());
    assert!(dir.join("graph.json").exists());
}

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    chunkplan(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    init_project(dir.path());

    chunkplan(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    chunkplan(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn plan_writes_manifest() {
    let dir = tempfile::tempdir().unwrap();
    init_project(dir.path());

    chunkplan(dir.path()).arg("plan").assert().success();

    let manifest = dir.path().join("dist").join("manifest.json");
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manifest).unwrap()).unwrap();

    let index = &json["entrypoints"][0];
    assert_eq!(index["name"], "index");
    assert_eq!(
        index["chunks"],
        serde_json::json!(["vendors~about~index", "default~about~index", "index"])
    );
    assert_eq!(json["async_chunks"][0]["chunks"], serde_json::json!(["vendors~Chart", "Chart"]));
    assert!(json["chunks"]["index"]["file"]
        .as_str()
        .unwrap()
        .starts_with("index-"));
}

#[test]
fn plan_prints_manifest_in_development_mode() {
    let dir = tempfile::tempdir().unwrap();
    init_project(dir.path());

    chunkplan(dir.path())
        .args(["plan", "--print", "--mode", "development"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"entrypoints\""))
        .stdout(predicate::str::contains("\"file\": \"index.js\""));

    assert!(!dir.path().join("dist").exists());
}

#[test]
fn plan_honors_outdir() {
    let dir = tempfile::tempdir().unwrap();
    init_project(dir.path());

    chunkplan(dir.path())
        .args(["plan", "--outdir", "build"])
        .assert()
        .success();

    assert!(dir.path().join("build").join("manifest.json").exists());
}

#[test]
fn check_reports_graph() {
    let dir = tempfile::tempdir().unwrap();
    init_project(dir.path());

    chunkplan(dir.path())
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("7 modules (2 vendor)"))
        .stderr(predicate::str::contains("1 dynamic imports"));
}

#[test]
fn check_rejects_config_without_entries() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("chunkplan.toml"), "graph = \"graph.json\"\n").unwrap();

    chunkplan(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("At least one entry"));
}

#[test]
fn plan_rejects_unresolved_dependency() {
    let dir = tempfile::tempdir().unwrap();
    init_project(dir.path());
    fs::write(
        dir.path().join("graph.json"),
        r#"{ "modules": [ { "id": "src/index.js", "dependencies": ["src/missing.js"] } ] }"#,
    )
    .unwrap();

    chunkplan(dir.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("src/missing.js"));
}
