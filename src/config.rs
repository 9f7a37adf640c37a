use anyhow::Result;
use chrono::NaiveDate;

use crate::policy::PolicyTable;

/// Runtime configuration. Every field has an env override so deployments
/// never patch constants in code.
#[derive(Clone, Debug)]
pub struct Config {
    /// Source whose history defines the date axis and actual columns.
    pub reference_source: String,
    pub reference_slot: String,
    /// Cohorts to aggregate, in processing order.
    pub cohorts: Vec<String>,
    /// Name of the combined (all-cohorts) aggregate.
    pub combined_name: String,
    /// Cohort whose own export is truncated to the cutoff.
    pub cutoff_cohort: String,
    /// First date at which the least-covered eligible source had full
    /// participation. Configuration, never derived from coverage.
    pub cutoff_date: NaiveDate,
    pub sqlite_path: String,
    pub export_dir: String,
    pub catalog_base: String,
    pub catalog_page_limit: u32,
    pub fetch_max_pages: u32,
    pub skip_fetch: bool,
    /// Optional JSON policy table replacing the built-in one.
    pub policy_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            reference_source: std::env::var("REFERENCE_SOURCE").unwrap_or_else(|_| "CA".to_string()),
            reference_slot: std::env::var("REFERENCE_SLOT").unwrap_or_else(|_| "daily".to_string()),
            cohorts: std::env::var("COHORTS")
                .map(|v| v.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect())
                .unwrap_or_else(|_| vec!["eve".to_string(), "mid".to_string()]),
            combined_name: std::env::var("COMBINED_NAME").unwrap_or_else(|_| "daily".to_string()),
            cutoff_cohort: std::env::var("CUTOFF_COHORT").unwrap_or_else(|_| "mid".to_string()),
            cutoff_date: std::env::var("CUTOFF_DATE")
                .ok()
                .and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
                .unwrap_or_else(default_cutoff),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./draws.sqlite".to_string()),
            export_dir: std::env::var("EXPORT_DIR").unwrap_or_else(|_| "./out/aggregates".to_string()),
            catalog_base: std::env::var("CATALOG_BASE")
                .unwrap_or_else(|_| "https://www.lotterypost.com".to_string()),
            catalog_page_limit: std::env::var("CATALOG_PAGE_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            fetch_max_pages: std::env::var("FETCH_MAX_PAGES").ok().and_then(|v| v.parse().ok()).unwrap_or(40),
            skip_fetch: std::env::var("SKIP_FETCH")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            policy_path: std::env::var("POLICY_PATH").ok(),
        }
    }

    pub fn policy(&self) -> Result<PolicyTable> {
        match &self.policy_path {
            Some(path) => PolicyTable::from_json(&std::fs::read_to_string(path)?),
            None => Ok(PolicyTable::builtin()),
        }
    }

    pub fn cutoff_for(&self, cohort: &str) -> Option<NaiveDate> {
        (cohort == self.cutoff_cohort).then_some(self.cutoff_date)
    }
}

/// The midday cohort's youngest member started on 2008-06-09; earlier
/// midday rows are structurally incomplete.
fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2008, 6, 9).expect("valid default cutoff")
}
