//! Report fetching.
//!
//! The exporter never talks to a reporting API directly; it hands each
//! materialized query to a [`ReportFetcher`] and receives rows of named
//! columns back.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::query::MaterializedQuery;

/// One report row: column alias to cell value.
pub type Row = serde_json::Map<String, Value>;

/// Errors that can occur while fetching a report.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The reporting API rejected or failed the request.
    #[error("api error: {0}")]
    Api(String),

    /// Timeout elapsed.
    #[error("timeout elapsed after {0:?}")]
    Timeout(Duration),
}

/// Source of report rows.
#[async_trait::async_trait]
pub trait ReportFetcher: Send + Sync + 'static {
    /// Fetch the rows of `query` for `account`.
    ///
    /// `None` means the fetcher's own default account.
    async fn fetch(
        &self,
        query: &MaterializedQuery,
        account: Option<&str>,
    ) -> Result<Vec<Row>, FetchError>;
}

/// Fetcher that answers every query with one synthetic row.
///
/// Label columns are set to `dry_run`, metric columns to `1`. Useful to run
/// the whole pipeline without API access.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunFetcher;

#[async_trait::async_trait]
impl ReportFetcher for DryRunFetcher {
    async fn fetch(
        &self,
        query: &MaterializedQuery,
        account: Option<&str>,
    ) -> Result<Vec<Row>, FetchError> {
        tracing::debug!(
            collector = %query.collector,
            account = account.unwrap_or("-"),
            query = %query.query_text,
            "Dry run fetch"
        );
        let mut row = Row::new();
        for column in &query.label_columns {
            row.insert(column.clone(), Value::from("dry_run"));
        }
        for column in &query.metric_columns {
            row.insert(column.clone(), Value::from(1));
        }
        Ok(vec![row])
    }
}
