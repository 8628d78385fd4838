//! Iteration outcomes and the shared status handle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::RwLock;

use super::plan::DroppedCollector;

/// Pipeline stage a collector was dropped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SkipStage {
    Materialize,
    Fetch,
}

/// A collector (or one of its accounts) that produced no samples this iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCollector {
    pub collector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub stage: SkipStage,
    pub reason: String,
}

/// Summary of one scrape iteration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationReport {
    /// 1-based iteration number.
    pub iteration: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Selection as configured, `<default>` when empty.
    pub selection: String,
    /// Planned collector names in run order.
    pub collectors: Vec<String>,
    /// Resolved collectors dropped as similar to a more granular one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deduplicated: Vec<DroppedCollector>,
    pub skipped: Vec<SkippedCollector>,
    /// Samples handed to the exposition sink.
    pub samples: usize,
    /// Resolution error that caused the whole iteration to be skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IterationReport {
    /// True when the selection resolved.
    pub fn is_resolved(&self) -> bool {
        self.error.is_none()
    }
}

/// Latest iteration report, shared between the exporter and the HTTP server.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    latest: Arc<RwLock<Option<IterationReport>>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, report: IterationReport) {
        *self.latest.write().await = Some(report);
    }

    pub async fn latest(&self) -> Option<IterationReport> {
        self.latest.read().await.clone()
    }

    /// Ready once at least one iteration has completed.
    pub async fn is_ready(&self) -> bool {
        self.latest.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_handle() {
        let status = StatusHandle::new();
        assert!(!status.is_ready().await);

        let clone = status.clone();
        clone
            .publish(IterationReport {
                iteration: 1,
                collectors: vec!["performance".to_string()],
                ..Default::default()
            })
            .await;

        assert!(status.is_ready().await);
        assert_eq!(status.latest().await.unwrap().collectors, ["performance"]);
    }

    #[test]
    fn test_report_serialization() {
        let report = IterationReport {
            iteration: 2,
            selection: "search".to_string(),
            skipped: vec![SkippedCollector {
                collector: "keywords".to_string(),
                account: None,
                stage: SkipStage::Materialize,
                reason: "unresolved macro '{day}'".to_string(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skipped"][0]["stage"], "materialize");
        assert!(json["skipped"][0].get("account").is_none());
        assert!(json.get("error").is_none());
    }
}
