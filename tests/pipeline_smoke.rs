//! End-to-end run over a temp directory: seed the store, run the
//! aggregation pipeline offline, and check the exported files.

use chrono::NaiveDate;
use std::path::Path;
use tempfile::TempDir;

use drawgrid::config::Config;
use drawgrid::export::{check_aggregate_csv, CohortManifest};
use drawgrid::pipeline;
use drawgrid::series::DrawRecord;
use drawgrid::store::DrawStore;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn records(entries: &[(&str, [u8; 4])]) -> Vec<DrawRecord> {
    entries
        .iter()
        .map(|(d, digits)| DrawRecord { date: day(d), digits: *digits })
        .collect()
}

fn test_policy_json() -> &'static str {
    r#"{
        "version": 1,
        "sources": [
            {"id": "S1"},
            {"id": "S2"},
            {"id": "CA", "excluded": "prediction_target"}
        ],
        "cohorts": [
            {"name": "eve", "slot": "eve"},
            {"name": "mid", "slot": "mid"}
        ]
    }"#
}

fn test_config(dir: &Path, policy_path: &Path) -> Config {
    Config {
        reference_source: "CA".to_string(),
        reference_slot: "daily".to_string(),
        cohorts: vec!["eve".to_string(), "mid".to_string()],
        combined_name: "daily".to_string(),
        cutoff_cohort: "mid".to_string(),
        cutoff_date: day("2020-01-02"),
        sqlite_path: dir.join("draws.sqlite").display().to_string(),
        export_dir: dir.join("aggregates").display().to_string(),
        catalog_base: "https://example.net".to_string(),
        catalog_page_limit: 60,
        fetch_max_pages: 3,
        skip_fetch: true,
        policy_path: Some(policy_path.display().to_string()),
    }
}

fn seed_store(cfg: &Config) -> DrawStore {
    let mut store = DrawStore::open(&cfg.sqlite_path).unwrap();
    store.init().unwrap();

    store
        .upsert_records(
            "CA",
            "daily",
            &records(&[
                ("2020-01-01", [7, 6, 3, 1]),
                ("2020-01-02", [0, 1, 2, 3]),
                ("2020-01-03", [9, 8, 7, 6]),
            ]),
        )
        .unwrap();
    for id in ["S1", "S2"] {
        store
            .upsert_records(
                id,
                "eve",
                &records(&[("2020-01-01", [3, 0, 0, 0]), ("2020-01-02", [3, 0, 0, 0])]),
            )
            .unwrap();
        store
            .upsert_records(id, "mid", &records(&[("2020-01-02", [5, 5, 5, 5])]))
            .unwrap();
    }
    store
}

#[test]
fn offline_run_exports_cohort_and_combined_aggregates() {
    let dir = TempDir::new().unwrap();
    let policy_path = dir.path().join("policy.json");
    std::fs::write(&policy_path, test_policy_json()).unwrap();
    let cfg = test_config(dir.path(), &policy_path);
    let mut store = seed_store(&cfg);

    let report = pipeline::run_aggregation(&cfg, &mut store).unwrap();
    assert_eq!(report.axis_len, 3);
    assert!(report.failed.is_empty());
    assert_eq!(report.cohorts.len(), 2);

    // eve keeps the full axis; mid is truncated to the cutoff
    assert_eq!(report.cohorts[0].rows, 3);
    assert_eq!(report.cohorts[1].rows, 2);
    assert_eq!(report.combined_rows, Some(2));

    let export_dir = Path::new(&cfg.export_dir);
    let eve_csv = export_dir.join("CA_4_predict_eve_aggregate.csv");
    let check = check_aggregate_csv(&eve_csv, Some(8)).unwrap();
    assert_eq!(check.rows, 3);
    assert_eq!(check.bad_rows, 0);
    assert_eq!(check.full_rows, 2);
    assert_eq!(check.short_rows, 1);
    assert_eq!(check.missing_actuals, 0);

    let manifest: CohortManifest = serde_json::from_str(
        &std::fs::read_to_string(export_dir.join("eve_sources.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.cohort, "eve");
    assert_eq!(manifest.sources, vec!["S1".to_string(), "S2".to_string()]);
    assert_eq!(manifest.expected_row_sum, 8);
    assert_eq!(manifest.rows, 3);

    // the combined aggregate spans the truncated window and sums both
    // cohorts: 8 (eve) + 8 (mid) on the cutoff date
    let daily_csv = export_dir.join("CA_4_predict_daily_aggregate.csv");
    let daily_manifest: CohortManifest = serde_json::from_str(
        &std::fs::read_to_string(export_dir.join("daily_sources.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(daily_manifest.expected_row_sum, 16);
    let daily_check = check_aggregate_csv(&daily_csv, Some(16)).unwrap();
    assert_eq!(daily_check.rows, 2);
    assert_eq!(daily_check.full_rows, 1);
    assert_eq!(daily_check.short_rows, 1);
}

#[test]
fn unknown_stored_source_fails_only_its_cohort() {
    let dir = TempDir::new().unwrap();
    let policy_path = dir.path().join("policy.json");
    std::fs::write(&policy_path, test_policy_json()).unwrap();
    let cfg = test_config(dir.path(), &policy_path);
    let mut store = seed_store(&cfg);

    // a stray series in the eve slot that no policy rule covers
    store
        .upsert_records("ZZ", "eve", &records(&[("2020-01-01", [1, 1, 1, 1])]))
        .unwrap();

    let report = pipeline::run_aggregation(&cfg, &mut store).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "eve");
    assert!(report.failed[0].1.contains("ZZ"));

    // mid still ran and exported; eve wrote nothing
    assert_eq!(report.cohorts.len(), 1);
    assert_eq!(report.cohorts[0].diagnostics.cohort, "mid");
    assert!(!Path::new(&cfg.export_dir)
        .join("CA_4_predict_eve_aggregate.csv")
        .exists());
    // no combined aggregate without both cohorts
    assert_eq!(report.combined_rows, None);
}

#[test]
fn empty_reference_aborts_the_whole_run() {
    let dir = TempDir::new().unwrap();
    let policy_path = dir.path().join("policy.json");
    std::fs::write(&policy_path, test_policy_json()).unwrap();
    let cfg = test_config(dir.path(), &policy_path);

    let mut store = DrawStore::open(&cfg.sqlite_path).unwrap();
    store.init().unwrap();
    let err = pipeline::run_aggregation(&cfg, &mut store).unwrap_err();
    assert!(err.to_string().contains("no draws"));
}
