use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use truapi_client::prelude::{
    Breakdown, LoadTestClient, ResourceId, RunStatus, Session, TimeSeries,
};
use truapi_core::prelude::{DelegatedShutdownListener, LaunchResult};
use truapi_instruments::Reporter;
use url::Url;

use crate::progress::StatusSpinner;

/// Statuses after which a run no longer changes.
pub const TERMINAL_STATUSES: [&str; 6] =
    ["PASSED", "FAILED", "STOPPED", "ABORTED", "SYSTEM_ERROR", "HALTED"];

/// Statuses in which the run has no metrics to fetch yet.
const PENDING_STATUSES: [&str; 2] = ["INITIALIZING", "CHECKING_STATUS"];

/// Query window used before the run has a begin time worth measuring from.
const INITIAL_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Samples this recent may not have arrived on the service yet.
const INGEST_DELAY_MS: i64 = 15_000;

const MIN_WINDOW_MS: i64 = 5_000;

/// What the workflow passes on once the run is launched.
#[derive(Debug, Clone)]
pub struct RunHandoff {
    pub session: Session,
    pub base_url: Url,
    pub tenant_id: String,
    pub proxy: Option<String>,
    pub run_id: ResourceId,
}

impl RunHandoff {
    pub fn new(session: Session, run_id: ResourceId) -> Self {
        Self {
            base_url: session.base_url().clone(),
            tenant_id: session.tenant_id().to_string(),
            proxy: session.proxy().map(str::to_string),
            session,
            run_id,
        }
    }
}

/// One poll of a run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub status: RunStatus,
    /// Absent while the run is still starting up.
    pub series: Option<TimeSeries>,
    pub errors: Option<Vec<Value>>,
}

impl RunSnapshot {
    /// Regions the virtual users are running from.
    pub fn locations(&self) -> Vec<String> {
        self.series.as_ref().map(locations).unwrap_or_default()
    }
}

/// Follows a launched run until it finishes or the operator stops following it.
pub struct StatusReporter {
    client: LoadTestClient,
    run_id: ResourceId,
    poll_interval: Duration,
    show_progress: bool,
}

impl StatusReporter {
    pub fn new(handoff: RunHandoff, reporter: Arc<Reporter>, poll_interval: Duration) -> Self {
        log::debug!(
            "following run {} on {} for tenant {}",
            handoff.run_id,
            handoff.base_url,
            handoff.tenant_id
        );

        Self {
            client: LoadTestClient::new(handoff.session, reporter),
            run_id: handoff.run_id,
            poll_interval,
            show_progress: true,
        }
    }

    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Poll until the run reaches a terminal status, returning that status.
    ///
    /// Returns `None` if the shutdown signal arrived first. The run itself keeps going on the
    /// service in that case.
    pub async fn follow(
        &self,
        mut shutdown_listener: DelegatedShutdownListener,
    ) -> LaunchResult<Option<RunStatus>> {
        log::info!("following run {}...", self.run_id);

        let spinner = self
            .show_progress
            .then(|| StatusSpinner::start(&self.run_id));

        let outcome = loop {
            if shutdown_listener.should_shutdown() {
                break Ok(None);
            }

            let snapshot = tokio::select! {
                _ = shutdown_listener.wait_for_shutdown() => break Ok(None),
                snapshot = self.poll() => snapshot,
            };
            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) => break Err(e),
            };

            if let Some(spinner) = &spinner {
                spinner.update(&snapshot.status.ui_status);
            }
            log_snapshot(&snapshot);

            if is_terminal(&snapshot.status.ui_status) {
                break Ok(Some(snapshot.status));
            }

            tokio::select! {
                _ = shutdown_listener.wait_for_shutdown() => break Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        };

        if let Some(spinner) = spinner {
            spinner.finish();
        }

        match &outcome {
            Ok(Some(status)) => log::info!("run {} ended with {}", self.run_id, status.ui_status),
            Ok(None) => log::info!(
                "stopped following run {}, it is still running on the service",
                self.run_id
            ),
            Err(e) => log::error!("lost track of run {}: {e}", self.run_id),
        }

        outcome
    }

    /// Fetch the status and, once the run has started producing them, the metrics and errors.
    pub async fn poll(&self) -> LaunchResult<RunSnapshot> {
        let status = self.client.get_run_status(&self.run_id).await?;

        if PENDING_STATUSES.contains(&status.ui_status.as_str()) {
            return Ok(RunSnapshot {
                status,
                series: None,
                errors: None,
            });
        }

        let query = build_query(finish_time(&status, Utc::now().timestamp_millis()));
        let (series, errors) = tokio::try_join!(
            self.client.get_time_series(&self.run_id, &query),
            self.client.get_errors(&self.run_id),
        )?;

        Ok(RunSnapshot {
            status,
            series: Some(series),
            errors: Some(errors),
        })
    }
}

pub fn is_terminal(ui_status: &str) -> bool {
    TERMINAL_STATUSES.contains(&ui_status)
}

/// End of the query window in milliseconds since the run began.
pub fn finish_time(status: &RunStatus, now_ms: i64) -> i64 {
    let begin = status.load_test_begin_time.unwrap_or(now_ms);

    match status.ui_status.as_str() {
        "INITIALIZING" => INITIAL_WINDOW_MS,
        "RUNNING" => (now_ms - begin - INGEST_DELAY_MS).max(MIN_WINDOW_MS),
        _ => match status.load_test_end_time {
            Some(end) => end - begin,
            None => (now_ms - begin).max(MIN_WINDOW_MS),
        },
    }
}

/// The time series query for the window `[0, end_ms]`, keyed by the names the results come back
/// under.
pub fn build_query(end_ms: i64) -> Value {
    let series = |metric: &str, category: &str, points: u32, group_by: &[&str]| {
        let mut query = json!({
            "metric": metric,
            "category": category,
            "points": points,
            "startTime": 0,
            "endTime": end_ms,
        });
        if !group_by.is_empty() {
            query["groupBy"] = json!(group_by);
        }
        query
    };

    json!({
        "vusers": series("user_count", "user_count", 35, &["geo_location"]),
        "hits": series("hits_per_sec", "client", 35, &["geo_location"]),
        "throughput": series("mic_recv", "client", 35, &[]),
        "errors": series("errors", "errors", 10, &[]),
        "trt": series("trt", "transactions", 35, &["script_id", "transaction_name"]),
        "tps": series("tps", "transactions", 35, &["script_id", "transaction_name"]),
    })
}

/// Render an offset in milliseconds as `mm:ss`.
pub fn format_offset(offset_ms: f64) -> String {
    let total_seconds = (offset_ms / 1000.0).floor().max(0.0) as u64;

    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn locations(series: &TimeSeries) -> Vec<String> {
    series
        .get("vusers")
        .map(|vusers| {
            vusers
                .data
                .iter()
                .filter_map(|breakdown| breakdown.specifics.get("geo_location"))
                .map(|location| match location {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Tabled)]
struct MetricRow {
    metric: String,
    breakdown: String,
    at: String,
    #[tabled(display = "float2")]
    value: f64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn metric_rows(series: &TimeSeries) -> Vec<MetricRow> {
    series
        .iter()
        .flat_map(|(metric, metric_series)| {
            metric_series.data.iter().filter_map(move |breakdown| {
                breakdown.values.last().map(|point| MetricRow {
                    metric: metric.clone(),
                    breakdown: describe(breakdown),
                    at: format_offset(point.x),
                    value: point.y,
                })
            })
        })
        .collect()
}

fn describe(breakdown: &Breakdown) -> String {
    if breakdown.specifics.is_empty() {
        return "-".to_string();
    }

    breakdown
        .specifics
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn log_snapshot(snapshot: &RunSnapshot) {
    let status = &snapshot.status.ui_status;

    let Some(series) = &snapshot.series else {
        log::info!("run status: {status}");
        return;
    };

    let error_count = snapshot.errors.as_ref().map(Vec::len).unwrap_or_default();
    let rows = metric_rows(series);
    if rows.is_empty() {
        log::info!("run status: {status}, no samples yet, {error_count} errors");
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::modern());

    log::info!(
        "run status: {status}, locations: [{}], {error_count} errors\n{table}",
        locations(series).join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use truapi_client::prelude::{MetricSeries, TimePoint};

    fn status(ui_status: &str, begin: Option<i64>, end: Option<i64>) -> RunStatus {
        RunStatus {
            ui_status: ui_status.to_string(),
            load_test_begin_time: begin,
            load_test_end_time: end,
        }
    }

    #[test]
    fn initializing_run_asks_for_five_minutes() {
        assert_eq!(finish_time(&status("INITIALIZING", None, None), 0), 300_000);
    }

    #[test]
    fn running_run_skips_the_most_recent_samples() {
        let now = 1_000_000;

        assert_eq!(
            finish_time(&status("RUNNING", Some(now - 60_000), None), now),
            45_000
        );
        assert_eq!(
            finish_time(&status("RUNNING", Some(now - 10_000), None), now),
            5_000
        );
    }

    #[test]
    fn finished_run_asks_for_its_whole_duration() {
        assert_eq!(
            finish_time(&status("PASSED", Some(1_000), Some(601_000)), 9_999_999),
            600_000
        );
    }

    #[test]
    fn query_carries_window_and_grouping() {
        let query = build_query(42_000);

        assert_eq!(query["vusers"]["endTime"], json!(42_000));
        assert_eq!(query["vusers"]["groupBy"], json!(["geo_location"]));
        assert_eq!(query["errors"]["points"], json!(10));
        assert!(query["throughput"].get("groupBy").is_none());
        assert_eq!(
            query["tps"]["groupBy"],
            json!(["script_id", "transaction_name"])
        );
    }

    #[test]
    fn offsets_render_as_minutes_and_seconds() {
        assert_eq!(format_offset(0.0), "00:00");
        assert_eq!(format_offset(65_000.0), "01:05");
        assert_eq!(format_offset(600_999.0), "10:00");
    }

    #[test]
    fn locations_come_from_vusers_breakdowns() {
        let mut us = serde_json::Map::new();
        us.insert("geo_location".to_string(), json!("US"));
        let mut eu = serde_json::Map::new();
        eu.insert("geo_location".to_string(), json!("EU"));

        let series = TimeSeries::from([(
            "vusers".to_string(),
            MetricSeries {
                data: vec![
                    Breakdown {
                        specifics: us,
                        values: vec![TimePoint { x: 0.0, y: 1.0 }],
                    },
                    Breakdown {
                        specifics: eu,
                        values: vec![],
                    },
                ],
            },
        )]);

        assert_eq!(locations(&series), vec!["US".to_string(), "EU".to_string()]);
        assert_eq!(metric_rows(&series).len(), 1);
    }

    #[test]
    fn terminal_statuses() {
        assert!(is_terminal("PASSED"));
        assert!(is_terminal("SYSTEM_ERROR"));
        assert!(!is_terminal("RUNNING"));
    }
}
