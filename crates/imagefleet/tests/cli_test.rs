#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn imagefleet() -> Command {
    let mut cmd = Command::cargo_bin("imagefleet").unwrap();
    cmd.env_remove("IMAGEFLEET_FILE").env("RUST_LOG", "error");
    cmd
}

/// base, app (base に依存), tools の3イメージを持つプロジェクト
fn project(manifest: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("imagefleet.yml"), manifest).unwrap();
    dir
}

fn add_image(root: &Path, name: &str, dockerfile: Option<&str>) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    if let Some(content) = dockerfile {
        fs::write(dir.join("Dockerfile"), content).unwrap();
    }
}

const MANIFEST: &str = r#"
images:
  - name: base
    context: base
    tags: ["registry.example.com/base:1"]
    push: true
  - name: app
    context: app
    depends_on: [base]
    rewrite_from: base
  - name: tools
    context: tools
"#;

fn full_project() -> TempDir {
    let dir = project(MANIFEST);
    add_image(dir.path(), "base", Some("FROM alpine\n"));
    add_image(dir.path(), "app", Some("FROM base\nCOPY . /app\n"));
    add_image(dir.path(), "tools", Some("FROM alpine\n"));
    dir
}

fn json_report(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    imagefleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_cli_version() {
    imagefleet()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("imagefleet"));
}

#[test]
fn test_build_help() {
    imagefleet()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[TARGETS]"))
        .stdout(predicate::str::contains("--concurrency"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--tag-failure"));
}

#[test]
fn test_invalid_command() {
    imagefleet().arg("invalid-command").assert().failure();
}

#[test]
fn test_validate_without_manifest() {
    let dir = tempfile::tempdir().unwrap();
    imagefleet()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("マニフェストが見つかりません"));
}

#[test]
fn test_validate_ok() {
    let dir = full_project();
    imagefleet()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("イメージ: 3個"))
        .stdout(predicate::str::contains("ビルド段数: 2"));
}

#[test]
fn test_validate_cycle() {
    let dir = project(
        r#"
images:
  - name: x
    depends_on: [x]
"#,
    );
    imagefleet()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dependency cycle detected: x -> x"));
}

#[test]
fn test_validate_unknown_dependency() {
    let dir = project(
        r#"
images:
  - name: y
    depends_on: [z]
"#,
    );
    imagefleet()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown image 'z'"));
}

#[test]
fn test_validate_with_file_flag() {
    let dir = full_project();
    let other = tempfile::tempdir().unwrap();
    imagefleet()
        .current_dir(other.path())
        .arg("-f")
        .arg(dir.path().join("imagefleet.yml"))
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_list_layers() {
    let dir = full_project();
    imagefleet()
        .current_dir(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("段階 1"))
        .stdout(predicate::str::contains("段階 2"))
        .stdout(predicate::str::contains("依存: base"))
        .stdout(predicate::str::contains("registry.example.com/base:1"));
}

#[test]
fn test_dry_run_build_json() {
    let dir = full_project();
    let output = imagefleet()
        .current_dir(dir.path())
        .args(["build", "--dry-run", "--json", "-j", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = json_report(&output);
    assert_eq!(report["outcome"], "succeeded");
    let images = report["images"].as_array().unwrap();
    assert_eq!(images.len(), 3);
    assert_eq!(images[0]["name"], "base");
    assert_eq!(images[0]["pushed"][0], "registry.example.com/base:1");
    assert!(images.iter().all(|i| i["status"] == "succeeded"));
}

#[test]
fn test_dry_run_no_push() {
    let dir = full_project();
    let output = imagefleet()
        .current_dir(dir.path())
        .args(["build", "--dry-run", "--json", "--no-push"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = json_report(&output);
    assert_eq!(report["images"][0]["tagged"][0], "registry.example.com/base:1");
    assert!(report["images"][0]["pushed"].as_array().unwrap().is_empty());
}

#[test]
fn test_dry_run_failure_skips_dependents() {
    let dir = project(MANIFEST);
    add_image(dir.path(), "base", None);
    add_image(dir.path(), "app", Some("FROM base\n"));
    add_image(dir.path(), "tools", Some("FROM alpine\n"));

    let output = imagefleet()
        .current_dir(dir.path())
        .args(["build", "--dry-run", "--json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let report = json_report(&output);
    assert_eq!(report["outcome"], "failed");
    assert_eq!(report["images"][0]["status"], "failed");
    assert_eq!(report["images"][1]["status"], "skipped");
    assert_eq!(report["images"][1]["error"]["root"], "base");
    assert_eq!(report["images"][2]["status"], "succeeded");
}

#[test]
fn test_dry_run_selected_target() {
    let dir = full_project();
    let output = imagefleet()
        .current_dir(dir.path())
        .args(["build", "app", "--dry-run", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = json_report(&output);
    let names: Vec<&str> = report["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["base", "app"]);
}

#[test]
fn test_unknown_target() {
    let dir = full_project();
    imagefleet()
        .current_dir(dir.path())
        .args(["build", "nope", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown build target: nope"));
}

#[test]
fn test_zero_concurrency() {
    let dir = full_project();
    imagefleet()
        .current_dir(dir.path())
        .args(["build", "--dry-run", "-j", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency must be at least 1"));
}

#[test]
fn test_invalid_tag_failure_policy() {
    imagefleet()
        .args(["build", "--tag-failure", "sometimes"])
        .assert()
        .failure();
}
