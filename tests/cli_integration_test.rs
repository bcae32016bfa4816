//! Integration tests for command exit codes

mod common;

use clap::Parser;
use common::*;
use slidescrub::cli::{Cli, Commands};
use tempfile::TempDir;
use tokio::sync::watch;

fn no_config(dir: &TempDir) -> String {
    dir.path()
        .join("absent.toml")
        .to_string_lossy()
        .into_owned()
}

fn parse(args: &[&str]) -> Commands {
    let mut argv = vec!["slidescrub"];
    argv.extend_from_slice(args);
    Cli::parse_from(argv).command
}

async fn run(command: Commands, config: &str) -> i32 {
    let (_tx, rx) = watch::channel(false);
    let result = match command {
        Commands::Scan(args) => args.execute(config, rx).await,
        Commands::Anonymize(args) => args.execute(config, rx).await,
        Commands::Verify(args) => args.execute(config, rx).await,
        Commands::Info(args) => args.execute(config).await,
        Commands::ValidateConfig(args) => args.execute(config).await,
        Commands::Init(args) => args.execute().await,
    };
    result.unwrap()
}

#[tokio::test]
async fn test_scan_exit_codes() {
    let dir = TempDir::new().unwrap();
    let config = no_config(&dir);
    let dirty = write(dir.path(), "dirty.tif", &dirty_tiff());
    let clean = write(dir.path(), "clean.tif", &clean_tiff());
    let broken = write(dir.path(), "broken.tif", &cyclic_tiff());

    let code = run(parse(&["scan", dirty.to_str().unwrap()]), &config).await;
    assert_eq!(code, 1);
    let code = run(parse(&["scan", clean.to_str().unwrap()]), &config).await;
    assert_eq!(code, 0);
    let code = run(parse(&["scan", broken.to_str().unwrap()]), &config).await;
    assert_eq!(code, 3);

    // failures win over findings
    let code = run(parse(&["scan", dir.path().to_str().unwrap()]), &config).await;
    assert_eq!(code, 3);
}

#[tokio::test]
async fn test_anonymize_then_verify() {
    let dir = TempDir::new().unwrap();
    let config = no_config(&dir);
    let input = dir.path().join("in");
    write(&input, "a.tif", &dirty_tiff());
    write(&input, "b.tif", &clean_tiff());
    let output = dir.path().join("out");
    let report = dir.path().join("report.json");

    let code = run(
        parse(&[
            "anonymize",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--report",
            report.to_str().unwrap(),
        ]),
        &config,
    )
    .await;
    assert_eq!(code, 0);
    assert!(report.is_file());
    assert!(output.join("a.tif").is_file());

    let code = run(parse(&["verify", output.to_str().unwrap()]), &config).await;
    assert_eq!(code, 0);
    let code = run(parse(&["verify", input.to_str().unwrap()]), &config).await;
    assert_eq!(code, 1);
}

#[tokio::test]
async fn test_anonymize_single_file_to_named_output() {
    let dir = TempDir::new().unwrap();
    let config = no_config(&dir);
    let source = write(dir.path(), "a.tif", &dirty_tiff());
    let dest = dir.path().join("clean/renamed.tif");

    let code = run(
        parse(&[
            "anonymize",
            source.to_str().unwrap(),
            "-o",
            dest.to_str().unwrap(),
        ]),
        &config,
    )
    .await;
    assert_eq!(code, 0);
    assert!(dest.is_file());
    assert_eq!(std::fs::read(&source).unwrap(), dirty_tiff());
}

#[tokio::test]
async fn test_anonymize_writes_compliance_certificate() {
    use sha2::{Digest, Sha256};

    let dir = TempDir::new().unwrap();
    let config = no_config(&dir);
    let source = write(dir.path(), "a.tif", &dirty_tiff());
    let certificate = dir.path().join("certs/run.json");

    let code = run(
        parse(&[
            "anonymize",
            source.to_str().unwrap(),
            "--in-place",
            "--certificate",
            certificate.to_str().unwrap(),
        ]),
        &config,
    )
    .await;
    assert_eq!(code, 0);

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&certificate).unwrap()).unwrap();
    assert_eq!(value["mode"], "in_place");
    assert_eq!(value["summary"]["verified"], true);
    let file = &value["files"][0];
    assert_eq!(file["verified_clean"], true);
    assert_eq!(file["image_integrity_verified"], true);
    assert!(file["findings_cleared"].as_u64().unwrap() >= 1);
    let digest = hex::encode(Sha256::digest(std::fs::read(&source).unwrap()));
    assert_eq!(file["sha256_after"], digest.as_str());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = no_config(&dir);
    let source = write(dir.path(), "a.tif", &dirty_tiff());

    let code = run(
        parse(&["anonymize", source.to_str().unwrap(), "--dry-run"]),
        &config,
    )
    .await;
    assert_eq!(code, 1);
    assert_eq!(std::fs::read(&source).unwrap(), dirty_tiff());
}

#[tokio::test]
async fn test_info_and_bad_config() {
    let dir = TempDir::new().unwrap();
    let config = no_config(&dir);
    let clean = write(dir.path(), "clean.tif", &clean_tiff());

    assert_eq!(
        run(parse(&["info", clean.to_str().unwrap(), "--json"]), &config).await,
        0
    );
    let missing = dir.path().join("missing.tif");
    assert_eq!(
        run(parse(&["info", missing.to_str().unwrap()]), &config).await,
        3
    );

    let bad = write(dir.path(), "bad.toml", b"[batch]\nworkers = 0\n");
    assert_eq!(
        run(
            parse(&["scan", clean.to_str().unwrap()]),
            bad.to_str().unwrap()
        )
        .await,
        2
    );
}
