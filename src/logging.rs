//! Structured logging for the aggregation pipeline.
//!
//! Design goals:
//! 1. Multi-level granularity (TRACE → FATAL)
//! 2. Domain categories for filtering (catalog, align, aggregate, ...)
//! 3. Per-run log directory for replay and audit
//! 4. Summarization-friendly cohort and session checkpoints

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Catalog,   // Remote fetches, paging, retries
    Store,     // Draw persistence
    Axis,      // Reference axis construction
    Policy,    // Cohort resolution, eligibility audit
    Align,     // Per-source axis projection, coverage
    Aggregate, // Summation, occupancy accounting
    Export,    // CSV and manifest output
    System,    // Startup, shutdown, per-run summaries
    Audit,     // Replay/audit trail entries
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Catalog => "catalog",
            Domain::Store => "store",
            Domain::Axis => "axis",
            Domain::Policy => "policy",
            Domain::Align => "align",
            Domain::Aggregate => "aggregate",
            Domain::Export => "export",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS is a comma-separated list, or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
    metrics: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let events_path = run_dir.join("events.jsonl");
        let trace_path = run_dir.join("trace.jsonl");
        let metrics_path = run_dir.join("metrics.jsonl");
        let manifest_path = run_dir.join("manifest.json");

        let _ = std::fs::write(
            manifest_path,
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        let events = File::create(events_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create events log: {}", err);
            File::create("/tmp/drawgrid-events.jsonl").expect("events fallback")
        });
        let trace = File::create(trace_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create trace log: {}", err);
            File::create("/tmp/drawgrid-trace.jsonl").expect("trace fallback")
        });
        let metrics = File::create(metrics_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create metrics log: {}", err);
            File::create("/tmp/drawgrid-metrics.jsonl").expect("metrics fallback")
        });

        RunContext {
            run_id,
            events: Mutex::new(BufWriter::new(events)),
            trace: Mutex::new(BufWriter::new(trace)),
            metrics: Mutex::new(BufWriter::new(metrics)),
        }
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["source_id", "slot", "cohort", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds (for replay correlation)
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Epoch seconds
pub fn ts_epoch() -> u64 {
    Utc::now().timestamp() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

/// Legacy compatibility: json_log with module name
pub fn json_log(module: &str, mut fields: Map<String, Value>) {
    fields.insert("ts".to_string(), Value::String(ts_now()));
    fields.insert("module".to_string(), Value::String(module.to_string()));
    emit_record(Level::Info, module, module, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if component == "metrics" || event.starts_with("metrics.") {
        write_line(&ctx.metrics, &line);
    }
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_fetch(source_id: &str, slot: &str, pages: u32, new_records: usize, malformed: u64) {
    log(
        Level::Info,
        Domain::Catalog,
        "fetch",
        obj(&[
            ("source_id", v_str(source_id)),
            ("slot", v_str(slot)),
            ("pages", json!(pages)),
            ("new_records", json!(new_records)),
            ("malformed", json!(malformed)),
        ]),
    );
}

pub fn log_coverage(source_id: &str, slot: &str, original: usize, aligned: usize, coverage: f64) {
    log(
        Level::Debug,
        Domain::Align,
        "coverage",
        obj(&[
            ("source_id", v_str(source_id)),
            ("slot", v_str(slot)),
            ("original", json!(original)),
            ("aligned", json!(aligned)),
            ("coverage_pct", v_num(coverage * 100.0)),
        ]),
    );
}

pub fn log_axis(source_id: &str, dates: usize, first: &str, last: &str) {
    log(
        Level::Info,
        Domain::Axis,
        "axis_built",
        obj(&[
            ("source_id", v_str(source_id)),
            ("dates", json!(dates)),
            ("first", v_str(first)),
            ("last", v_str(last)),
        ]),
    );
}

pub fn log_policy_audit(cohort_a: &str, cohort_b: &str, only_in_a: &[String]) {
    log(
        Level::Info,
        Domain::Policy,
        "cohort_difference",
        obj(&[
            ("cohort", v_str(cohort_a)),
            ("versus", v_str(cohort_b)),
            (
                "only_in_first",
                Value::Array(only_in_a.iter().map(|s| v_str(s)).collect()),
            ),
        ]),
    );
}

pub fn log_cohort_summary(
    cohort: &str,
    source_count: usize,
    expected_occupancy: u32,
    rows: usize,
    full_rows: u64,
    short_rows: u64,
    over_rows: u64,
    skipped_records: u64,
) {
    log(
        Level::Info,
        Domain::Aggregate,
        "cohort_summary",
        obj(&[
            ("cohort", v_str(cohort)),
            ("sources", json!(source_count)),
            ("expected_occupancy", json!(expected_occupancy)),
            ("rows", json!(rows)),
            ("full_rows", json!(full_rows)),
            ("short_rows", json!(short_rows)),
            ("over_rows", json!(over_rows)),
            ("skipped_records", json!(skipped_records)),
        ]),
    );
}

pub fn log_cohort_failure(cohort: &str, reason: &str) {
    log(
        Level::Error,
        Domain::Aggregate,
        "cohort_failed",
        obj(&[("cohort", v_str(cohort)), ("reason", v_str(reason))]),
    );
}

pub fn log_export(cohort: &str, path: &str, rows: usize, hash_sha256: &str) {
    log(
        Level::Info,
        Domain::Export,
        "aggregate_written",
        obj(&[
            ("cohort", v_str(cohort)),
            ("path", v_str(path)),
            ("rows", json!(rows)),
            ("hash_sha256", v_str(hash_sha256)),
        ]),
    );
}

/// Session summary on shutdown
pub fn log_session_summary(
    duration_secs: u64,
    cohorts_ok: usize,
    cohorts_failed: usize,
    combined_rows: Option<usize>,
    fetched_records: u64,
) {
    log(
        Level::Info,
        Domain::System,
        "session_summary",
        obj(&[
            ("duration_secs", json!(duration_secs)),
            ("cohorts_ok", json!(cohorts_ok)),
            ("cohorts_failed", json!(cohorts_failed)),
            ("combined_rows", json!(combined_rows)),
            ("fetched_records", json!(fetched_records)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_split_promotes_domain_keys() {
        let fields = obj(&[("cohort", v_str("eve")), ("rows", v_num(3.0))]);
        let (top, data) = split_fields(fields);
        assert!(top.contains_key("cohort"));
        assert!(data.contains_key("rows"));
        assert!(!data.contains_key("cohort"));
    }
}
