//! Aggregate output verification tool.
//!
//! Re-reads an exported aggregate CSV and checks shape (45 columns),
//! strictly increasing dates, digit ranges, and row sums against the
//! cohort manifest's expected_row_sum.
//!
//! Usage: verify_aggregate <aggregate.csv> [sources_manifest.json]

use anyhow::{anyhow, Result};
use serde_json::json;
use std::path::Path;

use drawgrid::export::{check_aggregate_csv, CohortManifest};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let csv = args
        .next()
        .ok_or_else(|| anyhow!("usage: verify_aggregate <aggregate.csv> [manifest.json]"))?;

    let expected = match args.next() {
        Some(path) => {
            let manifest: CohortManifest = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            Some(manifest.expected_row_sum)
        }
        None => None,
    };

    let check = check_aggregate_csv(Path::new(&csv), expected)?;
    let ok = check.bad_rows == 0 && check.non_monotonic == 0 && check.over_rows == 0;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "file": csv,
            "expected_row_sum": expected,
            "ok": ok,
            "check": check,
        }))?
    );

    if !ok {
        return Err(anyhow!("aggregate failed verification"));
    }
    Ok(())
}
