//! Exporter self-monitoring gauges.
//!
//! These live under a fixed `gaarf_` namespace, independent of the configured
//! export namespace, so dashboards keep working when the namespace changes.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::sample::{ExpositionError, ExpositionSink, Sample};

pub const EXPORTING_SECONDS: &str = "gaarf_exporting_seconds";
pub const REPORT_FETCHING_SECONDS: &str = "gaarf_report_fetching_seconds";
pub const QUERY_EXPORT_TIME_SECONDS: &str = "gaarf_query_export_time_seconds";
pub const DELAY_SECONDS: &str = "gaarf_delay_seconds";
pub const EXPORT_STARTED_SECONDS: &str = "gaarf_export_started_seconds";
pub const EXPORT_COMPLETED_SECONDS: &str = "gaarf_export_completed_seconds";
pub const API_REQUESTS_COUNT: &str = "gaarf_api_requests_count";

/// Writer for the service gauges.
pub struct ServiceGauges<'a> {
    sink: &'a dyn ExpositionSink,
}

impl<'a> ServiceGauges<'a> {
    pub fn new(sink: &'a dyn ExpositionSink) -> Self {
        Self { sink }
    }

    pub fn export_started(&self, at: DateTime<Utc>, delay: Duration) -> Result<(), ExpositionError> {
        self.sink
            .set_gauge(&Sample::new(EXPORT_STARTED_SECONDS, timestamp(at)))?;
        self.sink
            .set_gauge(&Sample::new(DELAY_SECONDS, delay.as_secs_f64()))
    }

    pub fn export_completed(
        &self,
        at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Result<(), ExpositionError> {
        self.sink
            .set_gauge(&Sample::new(EXPORTING_SECONDS, elapsed.as_secs_f64()))?;
        self.sink
            .set_gauge(&Sample::new(EXPORT_COMPLETED_SECONDS, timestamp(at)))
    }

    /// Time spent fetching one collector report for one account.
    pub fn report_fetched(
        &self,
        collector: &str,
        account: &str,
        elapsed: Duration,
    ) -> Result<(), ExpositionError> {
        self.sink.set_gauge(
            &Sample::new(REPORT_FETCHING_SECONDS, elapsed.as_secs_f64())
                .with_label("collector", collector)
                .with_label("account", account),
        )?;
        self.sink.add_gauge(&Sample::new(API_REQUESTS_COUNT, 1.0))
    }

    /// Time spent turning one report into samples.
    pub fn report_exported(
        &self,
        collector: &str,
        account: &str,
        elapsed: Duration,
    ) -> Result<(), ExpositionError> {
        self.sink.set_gauge(
            &Sample::new(QUERY_EXPORT_TIME_SECONDS, elapsed.as_secs_f64())
                .with_label("collector", collector)
                .with_label("account", account),
        )
    }
}

fn timestamp(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::GaugeRegistry;

    #[test]
    fn test_service_gauges() {
        let registry = GaugeRegistry::new();
        let gauges = ServiceGauges::new(&registry);
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        gauges.export_started(at, Duration::from_secs(900)).unwrap();
        gauges
            .report_fetched("performance", "123", Duration::from_millis(1500))
            .unwrap();
        gauges
            .report_fetched("mapping", "123", Duration::from_millis(10))
            .unwrap();
        gauges
            .export_completed(at, Duration::from_secs(3))
            .unwrap();

        assert_eq!(registry.value(EXPORT_STARTED_SECONDS, &[]), Some(1_700_000_000.0));
        assert_eq!(registry.value(DELAY_SECONDS, &[]), Some(900.0));
        assert_eq!(registry.value(EXPORTING_SECONDS, &[]), Some(3.0));
        assert_eq!(
            registry.value(
                REPORT_FETCHING_SECONDS,
                &[("account", "123"), ("collector", "performance")]
            ),
            Some(1.5)
        );
        assert_eq!(registry.value(API_REQUESTS_COUNT, &[]), Some(2.0));
    }
}
