mod catalog;
mod context;
mod error;
mod model;
mod session;

pub use catalog::{MetricCatalog, MetricKind, MetricSpec, ResourceKind};
pub use catalog::{
    MC_JOB__COMPLETED_CHECKPOINTS, MC_JOB__FAILED_CHECKPOINTS, MC_JOB__LAST_CHECKPOINT_DURATION,
    MC_JOB__LAST_CHECKPOINT_EXTERNAL_PATH, MC_JOB__NR_RESTARTS, MC_JOB__TOTAL_CHECKPOINTS, MC_JOB__UPTIME,
    MC_TM__CPU_CORES, MC_TM__FREE_MEMORY, MC_TM__FREE_SLOTS, MC_TM__HEAP_MAX, MC_TM__HEAP_USED, MC_TM__PHYSICAL_MEMORY,
    MC_TM__SLOTS, MC_VERTEX__BACKPRESSURE_LEVEL,
};
pub use context::FlinkContext;
pub use error::{FetchError, FlinkError, MetricLabel};
pub use model::*;
pub use session::{Ack, ConnectionSession, ConnectionState};

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts};

pub(crate) const OVERVIEW: &str = "overview";
pub(crate) const JOBS_OVERVIEW: &str = "jobs_overview";
pub(crate) const JOB_DETAIL: &str = "job_detail";
pub(crate) const JOB_CONFIG: &str = "job_config";
pub(crate) const JOB_EXCEPTIONS: &str = "job_exceptions";
pub(crate) const METRIC_PICKLIST: &str = "metric_picklist";
pub(crate) const METRIC_VALUES: &str = "metric_values";
pub(crate) const VERTEX_BACKPRESSURE: &str = "vertex_backpressure";
pub(crate) const TASKMANAGERS: &str = "taskmanagers";
pub(crate) const TASKMANAGER_DETAIL: &str = "taskmanager_detail";
pub(crate) const JARS: &str = "jars";

#[allow(clippy::cognitive_complexity)]
pub(crate) fn log_response(label: &str, endpoint: &url::Url, response: &reqwest::Response) {
    const PREAMBLE: &str = "flink response received";
    let status = response.status();
    if status.is_success() || status.is_informational() {
        tracing::debug!(%endpoint, ?response, "{PREAMBLE}: {label}");
    } else if status.is_client_error() {
        tracing::warn!(%endpoint, ?response, "{PREAMBLE}: {label}");
    } else {
        tracing::error!(%endpoint, ?response, "{PREAMBLE}: {label}");
    }
}

pub static FLINK_QUERY_TIME: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("flink_query_time", "Time spent querying the Flink REST API in seconds")
            .buckets(vec![0.05, 0.1, 0.15, 0.2, 0.3, 0.4, 0.5, 1.0, 2.5, 5.0, 7.5, 10.0]),
        &["action"],
    )
    .expect("failed creating flink_query_time metric")
});

#[inline]
pub(crate) fn start_flink_query_timer(action: &str) -> HistogramTimer {
    FLINK_QUERY_TIME.with_label_values(&[action]).start_timer()
}

pub static FLINK_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("flink_errors", "Number of errors calling the Flink API"),
        &["action", "error_type"],
    )
    .expect("failed creating flink_errors metric")
});

#[inline]
pub(crate) fn track_result<T, E: MetricLabel + std::fmt::Debug>(
    action: &str, result: Result<T, E>, error_message: &str,
) -> Result<T, E> {
    if let Err(ref err) = result {
        tracing::error!(error=?err, %action, "{}", error_message);
        track_flink_errors(action, err);
    }

    result
}

#[inline]
pub(crate) fn track_flink_errors<E: MetricLabel>(action: &str, error: &E) {
    FLINK_ERRORS.with_label_values(&[action, error.label().as_str()]).inc()
}
