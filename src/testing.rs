//! Test doubles.
//!
//! Fetchers with canned answers for exercising the scrape loop and the HTTP
//! surface without a reporting API. Not used by the binary.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::fetch::{FetchError, ReportFetcher, Row};
use crate::query::MaterializedQuery;

/// Canned answer for one collector.
#[derive(Debug, Clone)]
enum Reply {
    Rows(Vec<Row>),
    Failure(String),
    Stall(Duration),
}

/// Fetcher serving fixed rows per collector.
///
/// Collectors without rows return an empty report; collectors marked as
/// failing return [`FetchError::Api`].
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    replies: Arc<RwLock<HashMap<String, Reply>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `rows` for `collector`.
    pub fn with_rows(self, collector: impl Into<String>, rows: Vec<Row>) -> Self {
        self.reply(collector, Reply::Rows(rows))
    }

    /// Fail every fetch of `collector` with `message`.
    pub fn with_failure(self, collector: impl Into<String>, message: impl Into<String>) -> Self {
        self.reply(collector, Reply::Failure(message.into()))
    }

    /// Sleep for `delay` before answering `collector` with no rows.
    pub fn with_stall(self, collector: impl Into<String>, delay: Duration) -> Self {
        self.reply(collector, Reply::Stall(delay))
    }

    fn reply(self, collector: impl Into<String>, reply: Reply) -> Self {
        self.replies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collector.into(), reply);
        self
    }
}

#[async_trait::async_trait]
impl ReportFetcher for StaticFetcher {
    async fn fetch(
        &self,
        query: &MaterializedQuery,
        _account: Option<&str>,
    ) -> Result<Vec<Row>, FetchError> {
        let reply = self
            .replies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&query.collector)
            .cloned();
        match reply {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Failure(message)) => Err(FetchError::Api(message)),
            Some(Reply::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(collector: &str) -> MaterializedQuery {
        MaterializedQuery {
            collector: collector.to_string(),
            query_text: "SELECT 1".to_string(),
            metric_prefix: "googleads_".to_string(),
            metric_columns: vec!["clicks".to_string()],
            label_columns: vec!["campaign_id".to_string()],
        }
    }

    #[tokio::test]
    async fn test_static_fetcher() {
        let mut row = Row::new();
        row.insert("clicks".to_string(), json!(4));
        let fetcher = StaticFetcher::new()
            .with_rows("performance", vec![row])
            .with_failure("mapping", "quota exceeded");

        let rows = fetcher.fetch(&query("performance"), Some("1")).await.unwrap();
        assert_eq!(rows[0]["clicks"], json!(4));

        let err = fetcher.fetch(&query("mapping"), None).await.unwrap_err();
        assert_eq!(err.to_string(), "api error: quota exceeded");

        assert!(fetcher.fetch(&query("other"), None).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_fetch_answers_after_delay() {
        let fetcher = StaticFetcher::new().with_stall("slow", Duration::from_secs(30));
        let rows = fetcher.fetch(&query("slow"), None).await.unwrap();
        assert!(rows.is_empty());
    }
}
