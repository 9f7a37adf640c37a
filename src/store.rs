use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::aggregate::CohortDiagnostics;
use crate::series::{DrawRecord, SourceSeries};

/// Append-only draw storage keyed (source_id, slot, draw_date), plus a
/// per-run diagnostics trail for auditing.
pub struct DrawStore {
    conn: Connection,
}

impl DrawStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS draws (
                source_id TEXT NOT NULL,
                slot TEXT NOT NULL,
                draw_date TEXT NOT NULL,
                d1 INTEGER NOT NULL,
                d2 INTEGER NOT NULL,
                d3 INTEGER NOT NULL,
                d4 INTEGER NOT NULL,
                PRIMARY KEY (source_id, slot, draw_date)
            );
            CREATE TABLE IF NOT EXISTS cohort_runs (
                ts INTEGER NOT NULL,
                cohort TEXT NOT NULL,
                source_count INTEGER NOT NULL,
                expected_occupancy INTEGER NOT NULL,
                rows INTEGER NOT NULL,
                full_rows INTEGER NOT NULL,
                short_rows INTEGER NOT NULL,
                skipped_records INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Insert new records; existing (source, slot, date) keys are left
    /// untouched. Returns the number of rows actually added.
    pub fn upsert_records(&mut self, source_id: &str, slot: &str, records: &[DrawRecord]) -> Result<u64> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO draws (source_id, slot, draw_date, d1, d2, d3, d4)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for rec in records {
                inserted += stmt.execute(params![
                    source_id,
                    slot,
                    rec.date.format("%Y-%m-%d").to_string(),
                    rec.digits[0] as i64,
                    rec.digits[1] as i64,
                    rec.digits[2] as i64,
                    rec.digits[3] as i64,
                ])? as u64;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Load one source's series for a slot, ordered by date. A source
    /// with no rows yields an empty series, not an error.
    pub fn load_series(&self, source_id: &str, slot: &str) -> Result<SourceSeries> {
        let mut stmt = self.conn.prepare(
            "SELECT draw_date, d1, d2, d3, d4 FROM draws
             WHERE source_id = ?1 AND slot = ?2 ORDER BY draw_date",
        )?;
        let rows = stmt.query_map(params![source_id, slot], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (date_str, d1, d2, d3, d4) = row?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")?;
            records.push(DrawRecord {
                date,
                digits: [d1 as u8, d2 as u8, d3 as u8, d4 as u8],
            });
        }
        Ok(SourceSeries::new(source_id, slot, records))
    }

    pub fn last_date(&self, source_id: &str, slot: &str) -> Result<Option<NaiveDate>> {
        let latest: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(draw_date) FROM draws WHERE source_id = ?1 AND slot = ?2",
                params![source_id, slot],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        match latest {
            Some(s) => Ok(Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d")?)),
            None => Ok(None),
        }
    }

    /// Every (source_id, slot) pair with at least one stored draw.
    pub fn list_series(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT source_id, slot FROM draws ORDER BY source_id, slot")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn record_cohort_run(&mut self, ts: u64, diag: &CohortDiagnostics, rows: usize) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cohort_runs
             (ts, cohort, source_count, expected_occupancy, rows, full_rows, short_rows, skipped_records)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ts as i64,
                diag.cohort,
                diag.source_count as i64,
                diag.expected_occupancy as i64,
                rows as i64,
                diag.full_rows as i64,
                diag.short_rows as i64,
                diag.skipped_records as i64,
            ],
        )?;
        Ok(())
    }
}
