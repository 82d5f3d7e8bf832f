//! Socrata (SODA 2.0) paging client for datos.gov.co
//!
//! Pages are requested with `$limit`/`$offset` and a stable `$order` until
//! the server returns a short page.

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{SourceFetcher, SourceLocation};
use crate::error::LoadTaskError;

/// One SODA query
#[derive(Debug, Clone)]
pub struct SocrataQuery {
    pub endpoint: Url,
    /// `$where` clause
    pub filter: Option<String>,
    /// `$order` column; needed for paging to be stable
    pub order_by: String,
    pub page_size: usize,
    pub app_token: Option<String>,
}

impl SocrataQuery {
    fn page_params(&self, offset: usize) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("$limit", self.page_size.to_string()),
            ("$offset", offset.to_string()),
            ("$order", self.order_by.clone()),
        ];
        if let Some(ref filter) = self.filter {
            params.push(("$where", filter.clone()));
        }
        params
    }
}

/// Quote a literal for a SoQL `$where` clause.
pub fn soql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl SourceFetcher {
    /// Fetch every row matching `query`.
    pub async fn fetch_socrata_rows(&self, query: &SocrataQuery) -> Result<Vec<Value>, LoadTaskError> {
        let location = query.endpoint.to_string();
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let mut request = self
                .client()
                .get(query.endpoint.clone())
                .query(&query.page_params(offset));
            if let Some(ref token) = query.app_token {
                request = request.header("X-App-Token", token);
            }

            let page: Vec<Value> = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|source| LoadTaskError::Http {
                    location: location.clone(),
                    source,
                })?
                .json()
                .await
                .map_err(|source| LoadTaskError::Http {
                    location: location.clone(),
                    source,
                })?;

            let fetched = page.len();
            debug!(offset, fetched, "Fetched Socrata page");
            rows.extend(page);

            if fetched < query.page_size {
                break;
            }
            offset += fetched;
        }

        info!(endpoint = %location, rows = rows.len(), "Fetched Socrata dataset");
        Ok(rows)
    }

    /// Rows from a Socrata endpoint, or from a local JSON array dump of one.
    pub async fn fetch_rows(
        &self,
        location: &SourceLocation,
        remote_query: impl FnOnce(Url) -> SocrataQuery,
    ) -> Result<Vec<Value>, LoadTaskError> {
        match location {
            SourceLocation::Remote(url) => self.fetch_socrata_rows(&remote_query(url.clone())).await,
            SourceLocation::Local(_) => {
                let text = self.fetch_text(location).await?;
                serde_json::from_str(&text).map_err(|e| {
                    LoadTaskError::parse(location.to_string(), format!("expected a JSON array of rows ({})", e))
                })
            },
        }
    }
}
