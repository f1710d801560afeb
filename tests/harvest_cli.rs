mod catalog_stub;

use predicates::prelude::*;

use catalog_stub::{CatalogStub, CatalogStubConfig, numbered_books};

#[test]
fn list_phase_prints_summary_and_writes_checkpoint() -> anyhow::Result<()> {
    let stub = CatalogStub::spawn(CatalogStubConfig {
        books: numbered_books(3),
        ..Default::default()
    });
    let temp = tempfile::TempDir::new()?;
    let state_dir = temp.path().join("state");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookharvest");
    cmd.env("NO_COLOR", "1").args([
        "--phase",
        "list",
        "--state-dir",
        state_dir.to_str().unwrap(),
        "--data-dir",
        temp.path().join("data").to_str().unwrap(),
        "--api-base",
        &stub.api_base,
        "--cdn-base",
        &stub.cdn_base,
        "--list-delay-ms",
        "0",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Total books: 3"))
    .stderr(predicate::str::contains("book list complete"));

    let checkpoint: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        state_dir.join("harvest-state.json"),
    )?)?;
    assert_eq!(checkpoint["book_list_complete"], true);
    assert_eq!(checkpoint["books"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn unreachable_catalog_fails_with_resume_hint() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookharvest");
    cmd.args([
        "--phase",
        "2",
        "--state-dir",
        temp.path().join("state").to_str().unwrap(),
        "--data-dir",
        temp.path().join("data").to_str().unwrap(),
        "--api-base",
        "http://127.0.0.1:9/customer",
        "--http-timeout-secs",
        "2",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Re-run to resume"));
    Ok(())
}

#[test]
fn unknown_phase_is_rejected() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookharvest");
    cmd.args(["--phase", "publish"]).assert().failure();
}
