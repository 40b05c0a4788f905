//! Exercises the intake chain's `inventory` -> `app_data` hop end to end,
//! without a NATS connection — mirroring the teacher's
//! `tests/rate_limit_test.rs` style of driving multiple components
//! together in-process rather than over the wire.

use sonicat::appdata::analysis::AnalysisStore;
use sonicat::appdata::tokens::TokenStore;
use sonicat::catalog::CatalogStore;
use sonicat::task::Task;
use sonicat_workers::workers::app_data::AppDataWorker;
use sonicat_workers::workers::inventory::InventoryWorker;
use sonicat_workers::Worker;
use std::collections::HashMap;
use tempfile::TempDir;

#[tokio::test]
async fn inventory_survey_is_cataloged_and_rewritten_into_an_archive_command() {
    let dir = TempDir::new().unwrap();
    let asset_dir = dir.path().join("Acme Sounds - Pack Vol 1");
    std::fs::create_dir_all(&asset_dir).unwrap();
    std::fs::write(asset_dir.join("kick.wav"), b"fake wav bytes").unwrap();
    std::fs::write(asset_dir.join("snare.wav"), b"fake wav bytes").unwrap();

    let inventory = InventoryWorker::new();
    let survey_task = Task::new(
        "1".into(),
        "inventory",
        "inventory",
        serde_json::json!({ "data_path": asset_dir.to_string_lossy() }),
    );
    let surveyed = inventory.run_task(survey_task).await;
    assert!(surveyed.succeeded());

    let app_data = AppDataWorker::new(
        CatalogStore::open_in_memory().unwrap(),
        AnalysisStore::open_in_memory().unwrap(),
        TokenStore::open_in_memory().unwrap(),
        HashMap::new(),
    );
    let cataloged = app_data.run_task(surveyed).await;

    assert!(cataloged.succeeded());
    assert_eq!(cataloged.action, "archive");
    assert!(cataloged.args.get("path").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn a_second_pass_over_the_same_asset_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let asset_dir = dir.path().join("Acme Sounds - Pack Vol 1");
    std::fs::create_dir_all(&asset_dir).unwrap();
    std::fs::write(asset_dir.join("kick.wav"), b"fake wav bytes").unwrap();

    let inventory = InventoryWorker::new();
    let app_data = AppDataWorker::new(
        CatalogStore::open_in_memory().unwrap(),
        AnalysisStore::open_in_memory().unwrap(),
        TokenStore::open_in_memory().unwrap(),
        HashMap::new(),
    );

    for _ in 0..2 {
        let survey_task = Task::new(
            "1".into(),
            "inventory",
            "inventory",
            serde_json::json!({ "data_path": asset_dir.to_string_lossy() }),
        );
        let surveyed = inventory.run_task(survey_task).await;
        let cataloged = app_data.run_task(surveyed).await;
        assert!(cataloged.succeeded());
        assert_eq!(cataloged.action, "archive");
    }
}
