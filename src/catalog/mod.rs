//! Draw acquisition boundary. The pipeline core never talks to the
//! network; it consumes whatever a `DrawCatalog` implementation hands
//! the store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::Config;
use crate::series::DrawRecord;

pub mod http;
pub mod retry;

/// Result of one source's catalog pull.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// New records, oldest first.
    pub records: Vec<DrawRecord>,
    pub pages: u32,
    /// Entries the catalog served that did not parse as draws.
    pub malformed: u64,
}

#[async_trait]
pub trait DrawCatalog {
    /// Fetch records strictly newer than `since` for one source/slot.
    async fn fetch_since(
        &self,
        source_id: &str,
        slot: &str,
        since: Option<NaiveDate>,
    ) -> Result<FetchOutcome>;
}

#[derive(Clone, Copy, Debug)]
pub enum CatalogKind {
    Http,
    Null,
}

impl CatalogKind {
    pub fn from_env() -> Self {
        match std::env::var("CATALOG").unwrap_or_else(|_| "http".to_string()).as_str() {
            "null" => CatalogKind::Null,
            _ => CatalogKind::Http,
        }
    }

    pub fn build(self, cfg: &Config) -> Result<Box<dyn DrawCatalog + Send + Sync>> {
        match self {
            CatalogKind::Http => Ok(Box::new(http::HttpCatalog::new(cfg)?)),
            CatalogKind::Null => Ok(Box::new(NullCatalog)),
        }
    }
}

/// Offline stub: reports no new draws.
pub struct NullCatalog;

#[async_trait]
impl DrawCatalog for NullCatalog {
    async fn fetch_since(
        &self,
        _source_id: &str,
        _slot: &str,
        _since: Option<NaiveDate>,
    ) -> Result<FetchOutcome> {
        Ok(FetchOutcome::default())
    }
}
