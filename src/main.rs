use anyhow::{anyhow, Result};
use std::time::Instant;

use drawgrid::catalog::CatalogKind;
use drawgrid::config::Config;
use drawgrid::logging::{json_log, log_session_summary, obj, v_str};
use drawgrid::pipeline;
use drawgrid::store::DrawStore;

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let cfg = Config::from_env();
    json_log(
        "startup",
        obj(&[
            ("reference", v_str(&cfg.reference_source)),
            ("cohorts", v_str(&cfg.cohorts.join(","))),
            ("sqlite", v_str(&cfg.sqlite_path)),
            ("export_dir", v_str(&cfg.export_dir)),
        ]),
    );

    let mut store = DrawStore::open(&cfg.sqlite_path)?;
    store.init()?;

    let fetch = if cfg.skip_fetch {
        json_log("fetch", obj(&[("msg", v_str("skipped by SKIP_FETCH"))]));
        pipeline::FetchSummary::default()
    } else {
        let catalog = CatalogKind::from_env().build(&cfg)?;
        pipeline::fetch_updates(&mut store, catalog.as_ref()).await?
    };

    let report = pipeline::run_aggregation(&cfg, &mut store)?;

    log_session_summary(
        started.elapsed().as_secs(),
        report.cohorts.len(),
        report.failed.len(),
        report.combined_rows,
        fetch.records_added,
    );

    if report.cohorts.is_empty() {
        return Err(anyhow!("every cohort failed; see cohort_failed events"));
    }
    Ok(())
}
