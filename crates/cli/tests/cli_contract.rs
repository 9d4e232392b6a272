use assert_cmd::cargo::cargo_bin_cmd;
use pagemark_engine::sample::SampleDocument;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn write_fixture(dir: &Path, name: &str, document: SampleDocument) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, document.build().expect("sample should build")).expect("fixture should be written");
    path
}

fn two_pages(dir: &Path) -> PathBuf {
    write_fixture(
        dir,
        "two-pages.pdf",
        SampleDocument::new()
            .page(300.0, 200.0)
            .text(20.0, 40.0, 12.0, "Secret")
            .page(200.0, 400.0)
            .rotate(90),
    )
}

fn page_count(path: &Path) -> u64 {
    let output = cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    value["page_count"].as_u64().expect("page_count should be a number")
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());

    let output = cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][0]["number"], 1);
    assert_eq!(value["pages"][0]["width"], 300.0);
    assert_eq!(value["pages"][0]["height"], 200.0);
    assert_eq!(value["pages"][1]["rotation"], 90);
}

#[test]
fn render_writes_png_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());
    let output_path = temp.path().join("out").join("page.png");

    cargo_bin_cmd!("pagemark")
        .arg("render")
        .arg(&file)
        .arg("--page")
        .arg("2")
        .arg("--zoom")
        .arg("0.5")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("page.png"));

    let image = image::open(&output_path).expect("render should be a readable image");
    // Page 2 is rotated a quarter turn.
    assert_eq!((image.width(), image.height()), (200, 100));
}

#[test]
fn render_applies_edit_script() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());
    let edits = temp.path().join("edits.json");
    fs::write(
        &edits,
        r#"{
            "annotations": [
                { "id": "6f1c8a4e-2b7d-4c1e-9a55-0d3e2f7b8c91", "page_index": 0,
                  "bounds": { "x0": 100.0, "y0": 100.0, "x1": 200.0, "y1": 150.0 },
                  "body": { "kind": "mask_black" } }
            ]
        }"#,
    )
    .expect("edits should be written");
    let output_path = temp.path().join("masked.png");

    cargo_bin_cmd!("pagemark")
        .arg("render")
        .arg(&file)
        .arg("--zoom")
        .arg("1")
        .arg("--edits")
        .arg(&edits)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let image = image::open(&output_path).expect("render should be readable").to_rgba8();
    assert_eq!(image.get_pixel(150, 125).0, [0, 0, 0, 255]);
    assert_eq!(image.get_pixel(250, 180).0, [255, 255, 255, 255]);
}

#[test]
fn export_redacts_and_reports_summary() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());
    let edits = temp.path().join("edits.json");
    fs::write(
        &edits,
        r#"{
            "annotations": [
                { "id": "0b9d6f3a-7c2e-4f1b-8e4d-5a6c7b8d9e0f", "page_index": 0,
                  "bounds": { "x0": 10.0, "y0": 10.0, "x1": 110.0, "y1": 60.0 },
                  "body": { "kind": "redaction" } }
            ],
            "rotations": { "0": 180 }
        }"#,
    )
    .expect("edits should be written");
    let output_path = temp.path().join("exported.pdf");

    let output = cargo_bin_cmd!("pagemark")
        .arg("export")
        .arg(&file)
        .arg("--edits")
        .arg(&edits)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(summary["pages"], 2);
    assert_eq!(summary["removed_items"], 1);

    let exported = fs::read(&output_path).expect("export should exist");
    assert!(!exported.windows(6).any(|window| window == b"Secret"));

    let info = cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let info: Value = serde_json::from_slice(&info).expect("stdout should contain valid json");
    assert_eq!(info["pages"][0]["rotation"], 180);
}

#[test]
fn split_and_merge_round_trip_page_counts() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());
    let second = temp.path().join("second.pdf");
    let merged = temp.path().join("merged.pdf");

    cargo_bin_cmd!("pagemark")
        .args(["split"])
        .arg(&file)
        .args(["--from", "2", "--to", "2", "--output"])
        .arg(&second)
        .assert()
        .success();
    assert_eq!(page_count(&second), 1);

    cargo_bin_cmd!("pagemark")
        .arg("merge")
        .arg(&file)
        .arg(&second)
        .arg("--output")
        .arg(&merged)
        .assert()
        .success();
    assert_eq!(page_count(&merged), 3);
}

#[test]
fn split_rejects_out_of_range_pages() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());

    cargo_bin_cmd!("pagemark")
        .arg("split")
        .arg(&file)
        .args(["--from", "1", "--to", "5", "--output"])
        .arg(temp.path().join("never.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to split PDF"));
}

#[test]
fn config_reads_explicit_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = temp.path().join("config.json");
    fs::write(&config, r#"{ "version": 1, "config": { "cache_capacity": 9 } }"#)
        .expect("config should be written");

    let output = cargo_bin_cmd!("pagemark")
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["cache_capacity"], 9);
    assert_eq!(value["undo_depth"], 20);
    assert_eq!(value["redaction_fill"], "#d3d3d3");

    cargo_bin_cmd!("pagemark")
        .arg("config")
        .arg("--path")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("config.json"));
}

#[test]
fn info_fails_for_missing_file() {
    cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg("does-not-exist.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = temp.path().join("invalid.pdf");
    fs::write(&file, b"this is not a pdf").expect("fixture should be written");

    cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn render_rejects_page_zero() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = two_pages(temp.path());

    cargo_bin_cmd!("pagemark")
        .arg("render")
        .arg(&file)
        .arg("--page")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1-based"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pagemark")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
