//! In-process pipeline: fetch → store → axis → per-cohort
//! align/aggregate/truncate → combine → export. Stages hand tables off
//! by value; a failed cohort reports its diagnostics and aborts only
//! itself.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::aggregate::{self, AggregateTable, CohortDiagnostics};
use crate::align;
use crate::axis::{ActualTable, ReferenceAxis};
use crate::catalog::DrawCatalog;
use crate::combine;
use crate::config::Config;
use crate::export;
use crate::logging::{
    self, json_log, log_axis, log_cohort_failure, log_cohort_summary, log_coverage, log_export,
    log_fetch, log_policy_audit, obj, v_str,
};
use crate::policy::{CohortSpec, PolicyTable};
use crate::store::DrawStore;
use crate::truncate;

#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub sources_updated: usize,
    pub sources_failed: usize,
    pub records_added: u64,
}

/// Pull new draws for every series the store already tracks, resuming
/// each from its last stored date. One source failing never stops the
/// others.
pub async fn fetch_updates(
    store: &mut DrawStore,
    catalog: &(dyn DrawCatalog + Send + Sync),
) -> Result<FetchSummary> {
    let mut summary = FetchSummary::default();
    let targets = store.list_series()?;
    if targets.is_empty() {
        json_log("fetch", obj(&[("msg", v_str("store tracks no series; nothing to update"))]));
        return Ok(summary);
    }
    for (source_id, slot) in targets {
        let since = store.last_date(&source_id, &slot)?;
        match catalog.fetch_since(&source_id, &slot, since).await {
            Ok(outcome) => {
                let added = store.upsert_records(&source_id, &slot, &outcome.records)?;
                log_fetch(&source_id, &slot, outcome.pages, outcome.records.len(), outcome.malformed);
                summary.sources_updated += 1;
                summary.records_added += added;
            }
            Err(err) => {
                logging::log(
                    logging::Level::Warn,
                    logging::Domain::Catalog,
                    "fetch_failed",
                    obj(&[
                        ("source_id", v_str(&source_id)),
                        ("slot", v_str(&slot)),
                        ("reason", v_str(&err.to_string())),
                    ]),
                );
                summary.sources_failed += 1;
            }
        }
    }
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct CohortRun {
    pub diagnostics: CohortDiagnostics,
    pub rows: usize,
    pub csv_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub axis_len: usize,
    pub cohorts: Vec<CohortRun>,
    pub failed: Vec<(String, String)>,
    pub combined_rows: Option<usize>,
}

struct CohortOutcome {
    spec: CohortSpec,
    table: AggregateTable,
    run: CohortRun,
}

/// Build the axis once, then run every configured cohort and the
/// combined aggregate. Returns a report of diagnostic counters.
pub fn run_aggregation(cfg: &Config, store: &mut DrawStore) -> Result<PipelineReport> {
    let reference = store
        .load_series(&cfg.reference_source, &cfg.reference_slot)
        .with_context(|| format!("loading reference series {}", cfg.reference_source))?;
    let axis = ReferenceAxis::build(&reference)?;
    let actuals = ActualTable::build(&reference, &axis);
    let (first, last) = axis.span();
    log_axis(
        axis.source_id(),
        axis.len(),
        &first.format("%Y-%m-%d").to_string(),
        &last.format("%Y-%m-%d").to_string(),
    );

    let policy = cfg.policy()?;
    std::fs::create_dir_all(&cfg.export_dir)?;
    let known = store.list_series()?;

    let mut report = PipelineReport { axis_len: axis.len(), ..Default::default() };
    let mut outcomes: Vec<CohortOutcome> = Vec::new();

    for name in &cfg.cohorts {
        match run_cohort(cfg, store, &policy, name, &axis, &actuals, &known) {
            Ok(outcome) => {
                report.cohorts.push(outcome.run.clone());
                outcomes.push(outcome);
            }
            Err(err) => {
                log_cohort_failure(name, &err.to_string());
                report.failed.push((name.clone(), err.to_string()));
            }
        }
    }

    if outcomes.len() == 2 {
        log_policy_audit(
            &outcomes[0].spec.name,
            &outcomes[1].spec.name,
            &PolicyTable::difference(&outcomes[0].spec, &outcomes[1].spec),
        );
        log_policy_audit(
            &outcomes[1].spec.name,
            &outcomes[0].spec.name,
            &PolicyTable::difference(&outcomes[1].spec, &outcomes[0].spec),
        );

        let b = outcomes.pop().expect("two cohort outcomes");
        let a = outcomes.pop().expect("two cohort outcomes");
        report.combined_rows = Some(export_combined(cfg, store, a, b)?);
    } else if outcomes.len() > 2 {
        json_log(
            "combine",
            obj(&[("msg", v_str("more than two cohorts configured; combined aggregate skipped"))]),
        );
    }

    Ok(report)
}

fn run_cohort(
    cfg: &Config,
    store: &mut DrawStore,
    policy: &PolicyTable,
    name: &str,
    axis: &ReferenceAxis,
    actuals: &ActualTable,
    known: &[(String, String)],
) -> Result<CohortOutcome> {
    let def = policy
        .cohort(name)
        .ok_or_else(|| anyhow!("no cohort named {} in policy table", name))?;
    let spec = policy.resolve(name)?;

    // Every stored series in this cohort's slot must have a policy rule
    // before any aggregation runs.
    for (source_id, _) in known.iter().filter(|(_, slot)| *slot == spec.slot) {
        policy.classify(def, source_id)?;
    }

    let mut series_list = Vec::with_capacity(spec.sources.len());
    for source_id in &spec.sources {
        series_list.push(store.load_series(source_id, &spec.slot)?);
    }

    let aligned = align::align_all(&series_list, axis);
    for a in &aligned {
        log_coverage(&a.source_id, &a.slot, a.original_len, a.rows.len(), a.coverage());
    }

    let (table, diagnostics) = aggregate::aggregate(&spec, &aligned, axis, actuals);
    let table = match cfg.cutoff_for(name) {
        Some(cutoff) => truncate::truncate_from(table, cutoff),
        None => table,
    };

    let sources: Vec<String> = spec.sources.iter().cloned().collect();
    let csv_path = export_table(cfg, &table, &sources, spec.expected_occupancy, export::manifest_notes(&spec, spec.expected_occupancy))?;

    log_cohort_summary(
        name,
        diagnostics.source_count,
        diagnostics.expected_occupancy,
        table.len(),
        diagnostics.full_rows,
        diagnostics.short_rows,
        diagnostics.over_rows,
        diagnostics.skipped_records,
    );
    store.record_cohort_run(logging::ts_epoch(), &diagnostics, table.len())?;

    let run = CohortRun { diagnostics, rows: table.len(), csv_path };
    Ok(CohortOutcome { spec, table, run })
}

fn export_combined(
    cfg: &Config,
    store: &mut DrawStore,
    a: CohortOutcome,
    b: CohortOutcome,
) -> Result<usize> {
    // both sides share the cutoff so the union starts at full
    // participation; truncating an already-truncated table is a no-op
    let left = truncate::truncate_from(a.table, cfg.cutoff_date);
    let right = truncate::truncate_from(b.table, cfg.cutoff_date);
    let mut combined = combine::combine(left, right)?;
    combined.cohort = cfg.combined_name.clone();

    let mut sources: Vec<String> = a.spec.sources.union(&b.spec.sources).cloned().collect();
    sources.sort();
    let expected = a.spec.expected_occupancy + b.spec.expected_occupancy;
    let notes = format!(
        "{} aggregate: {} + {} summed per date, expected_row_sum={}",
        cfg.combined_name, a.spec.name, b.spec.name, expected
    );
    export_table(cfg, &combined, &sources, expected, notes)?;

    let diagnostics = CohortDiagnostics {
        cohort: cfg.combined_name.clone(),
        source_count: sources.len(),
        expected_occupancy: expected,
        full_rows: (0..combined.len())
            .filter(|&i| combined.row_sum(i) == expected)
            .count() as u64,
        short_rows: (0..combined.len())
            .filter(|&i| combined.row_sum(i) < expected)
            .count() as u64,
        over_rows: (0..combined.len())
            .filter(|&i| combined.row_sum(i) > expected)
            .count() as u64,
        skipped_records: 0,
    };
    store.record_cohort_run(logging::ts_epoch(), &diagnostics, combined.len())?;
    log_cohort_summary(
        &cfg.combined_name,
        diagnostics.source_count,
        expected,
        combined.len(),
        diagnostics.full_rows,
        diagnostics.short_rows,
        diagnostics.over_rows,
        0,
    );
    Ok(combined.len())
}

fn export_table(
    cfg: &Config,
    table: &AggregateTable,
    sources: &[String],
    expected_row_sum: u32,
    notes: String,
) -> Result<PathBuf> {
    let csv_path = Path::new(&cfg.export_dir)
        .join(export::aggregate_file_name(&table.reference, &table.cohort));
    let manifest_path = Path::new(&cfg.export_dir).join(export::manifest_file_name(&table.cohort));
    export::write_aggregate_csv(table, &csv_path)?;
    let manifest = export::write_manifest(
        table,
        sources,
        expected_row_sum,
        &csv_path,
        &manifest_path,
        notes,
    )?;
    log_export(&table.cohort, &csv_path.display().to_string(), table.len(), &manifest.hash_sha256);
    Ok(csv_path)
}
