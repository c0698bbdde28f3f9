use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

use crate::flink::{
    BackpressureReport, ClusterOverview, ConnectionState, ExecutionConfig, JobId, JobState, TaskManagerDetail,
    TaskManagerId, TaskManagerSummary, TaskState, VertexId,
};
use crate::math;
use crate::phases::diagnose::Assessment;
use crate::phases::normalize::{format_duration, format_percent, MetricIndex, TypedMetric};

const HIGH_UTILIZATION: f64 = 0.90;
const MODERATE_UTILIZATION: f64 = 0.70;
const LOW_AVAILABILITY: f64 = 0.20;
const HIGH_IDLE_RATIO: f64 = 0.50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<ClusterOverview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview_error: Option<String>,
}

/// Job detail with per-vertex io metrics and the insights drawn from them. `config_error` is set
/// when the execution config could not be retrieved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub jid: JobId,
    pub name: String,
    pub state: JobState,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
    pub total_parallelism: usize,
    pub failed_tasks: usize,
    pub vertices: Vec<VertexReport>,
    pub insights: Vec<Insight>,
    pub config: Option<ExecutionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexReport {
    pub id: VertexId,
    pub name: String,
    pub parallelism: usize,
    pub status: TaskState,
    pub duration: Option<i64>,
    pub failed_tasks: usize,
    pub metrics: MetricIndex,
    /// Records written per second over the vertex's lifetime.
    pub throughput: Option<f64>,
}

impl VertexReport {
    pub(super) fn insights(&self) -> Vec<Insight> {
        let mut insights = Vec::new();

        if let Some(backpressured) = self.metrics.value("accumulated-backpressured-time") {
            if 0.0 < backpressured {
                insights.push(Insight::Backpressure {
                    vertex: self.name.clone(),
                    backpressured_millis: backpressured,
                });
            }
        }

        let idle_ratio = self
            .metrics
            .value("accumulated-idle-time")
            .zip(self.duration)
            .and_then(|(idle, duration)| math::ratio(idle, duration as f64));
        if let Some(idle_ratio) = idle_ratio {
            if math::exceeds(idle_ratio, HIGH_IDLE_RATIO) {
                insights.push(Insight::HighIdle { vertex: self.name.clone(), idle_ratio });
            }
        }

        if 0 < self.failed_tasks {
            insights.push(Insight::FailedTasks { vertex: self.name.clone(), count: self.failed_tasks });
        }

        insights
    }
}

/// `write-records / duration * 1000`, only when both are positive.
pub(super) fn throughput(write_records: Option<f64>, duration_millis: Option<i64>) -> Option<f64> {
    let records = write_records.filter(|r| 0.0 < *r)?;
    math::ratio(records, duration_millis? as f64).map(|per_milli| per_milli * 1_000.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insight {
    Backpressure { vertex: String, backpressured_millis: f64 },
    HighIdle { vertex: String, idle_ratio: f64 },
    FailedTasks { vertex: String, count: usize },
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backpressure { vertex, backpressured_millis } => write!(
                f,
                "backpressure detected in '{vertex}': {}",
                format_duration(*backpressured_millis)
            ),
            Self::HighIdle { vertex, idle_ratio } => {
                write!(f, "high idle time in '{vertex}': {}", format_percent(*idle_ratio))
            },
            Self::FailedTasks { vertex, count } => write!(f, "failed tasks in '{vertex}': {count}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDiagnosis {
    pub job: JobId,
    pub fetched_at: DateTime<Utc>,
    /// Normalized job metrics in catalog order.
    pub metrics: Vec<TypedMetric>,
    pub assessment: Assessment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskManagersReport {
    pub taskmanagers: Vec<TaskManagerHealth>,
    pub capacity: ClusterCapacity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskManagerHealth {
    pub summary: TaskManagerSummary,
    pub metrics: MetricIndex,
    pub assessment: Assessment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskManagerReport {
    pub detail: TaskManagerDetail,
    pub metrics: MetricIndex,
    pub assessment: Assessment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskManagerMetrics {
    /// Metric ids the taskmanager exposes, grouped by their first three dot-separated segments.
    Available {
        taskmanager: TaskManagerId,
        total: usize,
        groups: BTreeMap<String, Vec<String>>,
    },
    Values {
        taskmanager: TaskManagerId,
        metrics: Vec<TypedMetric>,
        /// Requested names the taskmanager does not expose.
        missing: Vec<String>,
    },
}

const OTHER_GROUP: &str = "Other";

pub(super) fn group_metric_ids(ids: Vec<String>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for id in ids {
        let segments: Vec<&str> = id.split('.').collect();
        let group = if 3 <= segments.len() { segments[..3].join(".") } else { OTHER_GROUP.to_string() };
        groups.entry(group).or_default().push(id);
    }

    for ids in groups.values_mut() {
        ids.sort();
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackpressureDiagnosis {
    pub job: JobId,
    pub vertex: VertexId,
    pub report: BackpressureReport,
    pub metrics: MetricIndex,
    pub assessment: Assessment,
}

/// Slot totals across every registered taskmanager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCapacity {
    pub total_slots: i64,
    pub free_slots: i64,
    pub used_slots: i64,
    pub used_ratio: Option<f64>,
    pub free_ratio: Option<f64>,
    pub outlook: CapacityOutlook,
}

impl ClusterCapacity {
    pub fn from_taskmanagers<'a>(taskmanagers: impl IntoIterator<Item = &'a TaskManagerSummary>) -> Self {
        let (total_slots, free_slots) = taskmanagers.into_iter().fold((0, 0), |(total, free), tm| {
            (total + tm.slots_number.unwrap_or(0), free + tm.free_slots.unwrap_or(0))
        });

        let used_slots = total_slots - free_slots;
        Self {
            total_slots,
            free_slots,
            used_slots,
            used_ratio: math::ratio(used_slots as f64, total_slots as f64),
            free_ratio: math::ratio(free_slots as f64, total_slots as f64),
            outlook: CapacityOutlook::assess(total_slots, free_slots),
        }
    }
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CapacityOutlook {
    Exhausted,
    Low,
    Sufficient,
}

impl CapacityOutlook {
    pub fn assess(total_slots: i64, free_slots: i64) -> Self {
        if free_slots <= 0 {
            Self::Exhausted
        } else if (free_slots as f64) < total_slots as f64 * LOW_AVAILABILITY {
            Self::Low
        } else {
            Self::Sufficient
        }
    }

    pub const fn recommendation(&self) -> &'static str {
        match self {
            Self::Exhausted => "no free slots available; new jobs cannot be scheduled",
            Self::Low => "low slot availability; the cluster is near capacity",
            Self::Sufficient => "sufficient slot capacity available",
        }
    }
}

/// Coarse band for a utilization ratio.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum UtilizationBand {
    Low,
    Moderate,
    High,
}

impl UtilizationBand {
    pub fn from_ratio(ratio: f64) -> Self {
        if math::reaches(ratio, HIGH_UTILIZATION) {
            Self::High
        } else if math::reaches(ratio, MODERATE_UTILIZATION) {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}
