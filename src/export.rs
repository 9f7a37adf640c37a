//! Aggregate CSV output, cohort manifests, and the re-read checks used
//! by the verification tool.

use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::aggregate::AggregateTable;
use crate::encode::{column_labels, VECTOR_WIDTH};
use crate::logging::ts_now;
use crate::policy::CohortSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortManifest {
    pub cohort: String,
    pub reference: String,
    pub sources: Vec<String>,
    pub num_sources: usize,
    pub expected_row_sum: u32,
    pub rows: u64,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub csv: String,
    pub hash_sha256: String,
    pub generated_at: String,
    pub notes: String,
}

/// M/D/YYYY without zero padding, the format the aggregate consumers
/// already expect.
pub fn format_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

pub fn parse_export_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// date, 4 reference actual columns, 40 occurrence columns.
pub fn header(reference: &str) -> String {
    let mut cols = vec!["date".to_string()];
    for pos in 1..=4 {
        cols.push(format!("{}_QS{}", reference, pos));
    }
    cols.extend(column_labels());
    cols.join(",")
}

pub fn aggregate_file_name(reference: &str, cohort: &str) -> String {
    format!("{}_4_predict_{}_aggregate.csv", reference, cohort)
}

pub fn manifest_file_name(cohort: &str) -> String {
    format!("{}_sources.json", cohort)
}

pub fn write_aggregate_csv(table: &AggregateTable, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", header(&table.reference))?;
    for row in 0..table.len() {
        let mut line = format_date(table.dates[row]);
        match table.actual[row] {
            Some(digits) => {
                for d in digits {
                    line.push(',');
                    line.push_str(&d.to_string());
                }
            }
            None => line.push_str(",,,,"),
        }
        for cell in table.counts[row].iter() {
            line.push(',');
            line.push_str(&cell.to_string());
        }
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Write the manifest next to an already-written aggregate CSV.
pub fn write_manifest(
    table: &AggregateTable,
    sources: &[String],
    expected_row_sum: u32,
    csv_path: &Path,
    manifest_path: &Path,
    notes: String,
) -> Result<CohortManifest> {
    let manifest = CohortManifest {
        cohort: table.cohort.clone(),
        reference: table.reference.clone(),
        sources: sources.to_vec(),
        num_sources: sources.len(),
        expected_row_sum,
        rows: table.len() as u64,
        date_min: table.span().map(|(a, _)| format_date(a)),
        date_max: table.span().map(|(_, b)| format_date(b)),
        csv: csv_path.display().to_string(),
        hash_sha256: file_sha256(csv_path)?,
        generated_at: ts_now(),
        notes,
    };
    std::fs::write(manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(manifest)
}

pub fn manifest_notes(spec: &CohortSpec, expected_row_sum: u32) -> String {
    format!(
        "{} cohort: {} sources (slot {}), expected_row_sum={}. Sources: {:?}",
        spec.name,
        spec.sources.len(),
        spec.slot,
        expected_row_sum,
        spec.sources.iter().collect::<Vec<_>>()
    )
}

/// Shape and invariant checks over an exported aggregate CSV.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CsvCheck {
    pub rows: u64,
    pub bad_rows: u64,
    pub non_monotonic: u64,
    pub full_rows: u64,
    pub short_rows: u64,
    pub over_rows: u64,
    pub missing_actuals: u64,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
}

pub fn check_aggregate_csv(path: &Path, expected_row_sum: Option<u32>) -> Result<CsvCheck> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut check = CsvCheck::default();
    let mut prev: Option<NaiveDate> = None;
    let mut saw_header = false;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !saw_header {
            saw_header = true;
            if !trimmed.starts_with("date,") {
                return Err(anyhow!("missing header in {}", path.display()));
            }
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').collect();
        if fields.len() != 1 + 4 + VECTOR_WIDTH {
            check.bad_rows += 1;
            continue;
        }
        let date = match parse_export_date(fields[0]) {
            Some(d) => d,
            None => {
                check.bad_rows += 1;
                continue;
            }
        };
        if prev.map(|p| date <= p).unwrap_or(false) {
            check.non_monotonic += 1;
        }
        prev = Some(date);

        let actuals_ok = fields[1..5]
            .iter()
            .all(|f| f.is_empty() || matches!(f.parse::<u8>(), Ok(0..=9)));
        if !actuals_ok {
            check.bad_rows += 1;
            continue;
        }
        if fields[1..5].iter().any(|f| f.is_empty()) {
            check.missing_actuals += 1;
        }

        let mut sum = 0u32;
        let mut bad = false;
        for f in &fields[5..] {
            match f.parse::<u32>() {
                Ok(v) => sum += v,
                Err(_) => {
                    bad = true;
                    break;
                }
            }
        }
        if bad {
            check.bad_rows += 1;
            continue;
        }
        check.rows += 1;
        if check.date_min.is_none() {
            check.date_min = Some(fields[0].to_string());
        }
        check.date_max = Some(fields[0].to_string());
        if let Some(expected) = expected_row_sum {
            if sum == expected {
                check.full_rows += 1;
            } else if sum < expected {
                check.short_rows += 1;
            } else {
                check.over_rows += 1;
            }
        }
    }

    if !saw_header {
        return Err(anyhow!("empty aggregate file {}", path.display()));
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn date_format_round_trips_without_padding() {
        let date = day("2008-06-09");
        assert_eq!(format_date(date), "6/9/2008");
        assert_eq!(parse_export_date("6/9/2008"), Some(date));
        assert_eq!(parse_export_date("2008-06-09"), None);
    }

    #[test]
    fn header_has_45_columns() {
        let h = header("CA");
        assert_eq!(h.split(',').count(), 45);
        assert!(h.starts_with("date,CA_QS1,CA_QS2,CA_QS3,CA_QS4,QS1_0"));
        assert!(h.ends_with("QS4_9"));
    }

    #[test]
    fn written_aggregate_passes_checks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agg.csv");

        let mut table = AggregateTable::zeroed("eve", "CA", vec![day("2020-01-01"), day("2020-01-02")]);
        table.actual[0] = Some([7, 6, 3, 1]);
        table.counts[0][0] = 2;
        table.counts[0][13] = 2;
        table.counts[0][20] = 2;
        table.counts[0][30] = 2;
        write_aggregate_csv(&table, &path).unwrap();

        let check = check_aggregate_csv(&path, Some(8)).unwrap();
        assert_eq!(check.rows, 2);
        assert_eq!(check.bad_rows, 0);
        assert_eq!(check.non_monotonic, 0);
        assert_eq!(check.full_rows, 1);
        assert_eq!(check.short_rows, 1);
        assert_eq!(check.over_rows, 0);
        assert_eq!(check.missing_actuals, 1);
        assert_eq!(check.date_min.as_deref(), Some("1/1/2020"));
    }

    #[test]
    fn manifest_records_hash_and_span() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("agg.csv");
        let manifest_path = dir.path().join("eve_sources.json");

        let table = AggregateTable::zeroed("eve", "CA", vec![day("2020-01-01")]);
        write_aggregate_csv(&table, &csv_path).unwrap();
        let manifest = write_manifest(
            &table,
            &["NY".to_string(), "PA".to_string()],
            8,
            &csv_path,
            &manifest_path,
            "test".to_string(),
        )
        .unwrap();

        assert_eq!(manifest.num_sources, 2);
        assert_eq!(manifest.hash_sha256, file_sha256(&csv_path).unwrap());
        assert_eq!(manifest.date_min.as_deref(), Some("1/1/2020"));

        let text = std::fs::read_to_string(&manifest_path).unwrap();
        let back: CohortManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.expected_row_sum, 8);
    }
}
