use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::catalog::retry::{is_retryable_http_error, retry_async, PermanentError, RetryConfig};
use crate::catalog::{DrawCatalog, FetchOutcome};
use crate::config::Config;
use crate::series::DrawRecord;

/// Catalog client paging a remote results listing newest-first and
/// stopping once it reaches draws the store already holds.
pub struct HttpCatalog {
    client: Client,
    base: Url,
    page_limit: u32,
    max_pages: u32,
    retry: RetryConfig,
}

#[derive(Deserialize, Debug, Default)]
struct CatalogPage {
    #[serde(default)]
    draws: Vec<CatalogDraw>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize, Debug)]
struct CatalogDraw {
    date: String,
    numbers: Vec<i64>,
}

impl HttpCatalog {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base: Url::parse(&cfg.catalog_base)?,
            page_limit: cfg.catalog_page_limit,
            max_pages: cfg.fetch_max_pages,
            retry: RetryConfig::default(),
        })
    }

    fn page_url(&self, source_id: &str, slot: &str, page: u32) -> Result<Url> {
        let mut url = self
            .base
            .join(&format!("results/{}/{}", source_id.to_lowercase(), slot))?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("limit", &self.page_limit.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    async fn get_page(&self, url: Url) -> Result<CatalogPage> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            if is_retryable_http_error(status) {
                return Err(anyhow!("catalog http {}", status));
            }
            return Err(PermanentError(format!("catalog http {}", status)).into());
        }
        Ok(resp.json::<CatalogPage>().await?)
    }

    fn parse_draw(entry: &CatalogDraw) -> Option<DrawRecord> {
        let date = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").ok()?;
        if entry.numbers.len() != 4 {
            return None;
        }
        let mut digits = [0u8; 4];
        for (i, &n) in entry.numbers.iter().enumerate() {
            if !(0..=9).contains(&n) {
                return None;
            }
            digits[i] = n as u8;
        }
        Some(DrawRecord { date, digits })
    }
}

#[async_trait]
impl DrawCatalog for HttpCatalog {
    async fn fetch_since(
        &self,
        source_id: &str,
        slot: &str,
        since: Option<NaiveDate>,
    ) -> Result<FetchOutcome> {
        let mut out = FetchOutcome::default();
        for page in 1..=self.max_pages {
            let url = self.page_url(source_id, slot, page)?;
            let body = retry_async(&self.retry, "catalog_page", || {
                let url = url.clone();
                async move { self.get_page(url).await }
            })
            .await?;
            out.pages += 1;

            let mut reached_known = false;
            for entry in &body.draws {
                match Self::parse_draw(entry) {
                    Some(rec) => {
                        if since.map(|s| rec.date <= s).unwrap_or(false) {
                            reached_known = true;
                            continue;
                        }
                        out.records.push(rec);
                    }
                    None => out.malformed += 1,
                }
            }
            if reached_known || !body.has_more || body.draws.is_empty() {
                break;
            }
        }
        // the wire is newest-first; the store wants oldest-first
        out.records.sort_by_key(|r| r.date);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(date: &str, numbers: Vec<i64>) -> CatalogDraw {
        CatalogDraw { date: date.to_string(), numbers }
    }

    #[test]
    fn parses_well_formed_entries() {
        let rec = HttpCatalog::parse_draw(&draw("2020-01-01", vec![7, 6, 3, 1])).unwrap();
        assert_eq!(rec.digits, [7, 6, 3, 1]);
    }

    #[test]
    fn rejects_bad_dates_digit_counts_and_ranges() {
        assert!(HttpCatalog::parse_draw(&draw("01/01/2020", vec![1, 2, 3, 4])).is_none());
        assert!(HttpCatalog::parse_draw(&draw("2020-01-01", vec![1, 2, 3])).is_none());
        assert!(HttpCatalog::parse_draw(&draw("2020-01-01", vec![1, 2, 3, 12])).is_none());
        assert!(HttpCatalog::parse_draw(&draw("2020-01-01", vec![1, 2, 3, -1])).is_none());
    }

    #[test]
    fn page_urls_carry_paging_parameters() {
        let cfg = Config {
            reference_source: "CA".to_string(),
            reference_slot: "daily".to_string(),
            cohorts: vec!["eve".to_string()],
            combined_name: "daily".to_string(),
            cutoff_cohort: "mid".to_string(),
            cutoff_date: NaiveDate::from_ymd_opt(2008, 6, 9).unwrap(),
            sqlite_path: ":memory:".to_string(),
            export_dir: ".".to_string(),
            catalog_base: "https://example.net/lottery/".to_string(),
            catalog_page_limit: 25,
            fetch_max_pages: 3,
            skip_fetch: false,
            policy_path: None,
        };
        let catalog = HttpCatalog::new(&cfg).unwrap();
        let url = catalog.page_url("NY", "eve", 2).unwrap();
        assert_eq!(url.path(), "/lottery/results/ny/eve");
        assert!(url.query().unwrap().contains("page=2"));
        assert!(url.query().unwrap().contains("limit=25"));
    }
}
