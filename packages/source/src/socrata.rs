//! Socrata SODA API source.
//!
//! Pages through a dataset with `$limit`, `$offset`, `$order`, and an
//! optional `$where` lower date bound. The default configuration targets
//! the LAPD "Crime Data from 2020 to Present" dataset.

use std::sync::Arc;

use async_trait::async_trait;
use safety_map_source_models::{FieldMapping, RawRecord};

use crate::progress::ProgressCallback;
use crate::{CrimeSource, FetchOptions, SourceError, records_from_value, retry};

/// LAPD crime dataset endpoint.
pub const LAPD_API_URL: &str = "https://data.lacity.org/resource/2nrs-mtv8.json";

/// Records per page.
pub const DEFAULT_PAGE_SIZE: u64 = 1_000;

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A paginated Socrata dataset.
#[derive(Debug, Clone)]
pub struct SocrataSource {
    id: String,
    name: String,
    api_url: String,
    date_column: String,
    page_size: u64,
    mapping: FieldMapping,
}

impl SocrataSource {
    /// The Los Angeles Police Department dataset.
    #[must_use]
    pub fn lapd() -> Self {
        Self {
            id: "la_pd".to_string(),
            name: "Los Angeles Police Department".to_string(),
            api_url: LAPD_API_URL.to_string(),
            date_column: "date_occ".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            mapping: FieldMapping::lapd(),
        }
    }

    /// Points the source at a different endpoint with the same layout
    /// (mirrors, proxies, test servers).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// The endpoint this source fetches from.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Builds the SODA query parameters for one page.
    #[must_use]
    pub fn page_params(
        &self,
        offset: u64,
        page_limit: u64,
        options: &FetchOptions,
    ) -> Vec<(String, String)> {
        let mut params = vec![
            ("$limit".to_string(), page_limit.to_string()),
            ("$offset".to_string(), offset.to_string()),
            ("$order".to_string(), format!("{} DESC", self.date_column)),
        ];
        if let Some(since) = &options.since {
            params.push((
                "$where".to_string(),
                format!(
                    "{} >= '{}'",
                    self.date_column,
                    since.format("%Y-%m-%dT%H:%M:%S")
                ),
            ));
        }
        params
    }
}

#[async_trait]
impl CrimeSource for SocrataSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn field_mapping(&self) -> FieldMapping {
        self.mapping.clone()
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let fetch_limit = options.limit.unwrap_or(u64::MAX);
        if let Some(limit) = options.limit {
            progress.set_total(limit);
        }

        let mut all_records: Vec<RawRecord> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let remaining = fetch_limit.saturating_sub(offset);
            if remaining == 0 {
                break;
            }
            let page_limit = remaining.min(self.page_size);
            let params = self.page_params(offset, page_limit, options);

            log::debug!("Fetching {}: offset={offset}, limit={page_limit}", self.id);
            let body = retry::send_json(|| client.get(&self.api_url).query(&params)).await?;
            let (records, next_offset) = read_page(body, offset, page_limit)?;

            progress.inc(records.len() as u64);
            all_records.extend(records);
            progress.set_message(format!("{}: {} records", self.name, all_records.len()));

            let Some(next_offset) = next_offset else {
                break;
            };
            offset = next_offset;
        }

        log::info!("Downloaded {} {} records", all_records.len(), self.name);
        progress.finish(format!("{}: {} records", self.name, all_records.len()));
        Ok(all_records)
    }
}

/// Splits one page into its records and the offset of the next page, or
/// `None` if this was the last page. Offsets count every entry the server
/// returned, including non-object entries that get skipped.
fn read_page(
    body: serde_json::Value,
    offset: u64,
    page_limit: u64,
) -> Result<(Vec<RawRecord>, Option<u64>), SourceError> {
    let page_len = body.as_array().map_or(0, Vec::len) as u64;
    let records = records_from_value(body)?;
    let next_offset = (page_len > 0 && page_len >= page_limit).then_some(offset + page_len);
    Ok((records, next_offset))
}
