use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumString};

use super::{FlinkError, ResourceKind};

macro_rules! flink_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(rep: String) -> Self {
                Self(rep)
            }
        }

        impl From<&str> for $name {
            fn from(rep: &str) -> Self {
                Self(rep.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

flink_id!(JobId);
flink_id!(VertexId);
flink_id!(JarId);
flink_id!(
    /// Flink taskmanager resource id, e.g., `10.1.2.3:6122-ab12cd`.
    TaskManagerId
);

/// The resource a diagnostic request concerns. Ids are opaque; only emptiness is checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRef {
    Job { job: JobId },
    Vertex { job: JobId, vertex: VertexId },
    TaskManager { taskmanager: TaskManagerId },
}

impl ResourceRef {
    pub fn job(job: impl Into<JobId>) -> Self {
        Self::Job { job: job.into() }
    }

    pub fn vertex(job: impl Into<JobId>, vertex: impl Into<VertexId>) -> Self {
        Self::Vertex { job: job.into(), vertex: vertex.into() }
    }

    pub fn taskmanager(taskmanager: impl Into<TaskManagerId>) -> Self {
        Self::TaskManager { taskmanager: taskmanager.into() }
    }

    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Job { .. } => ResourceKind::Job,
            Self::Vertex { .. } => ResourceKind::Vertex,
            Self::TaskManager { .. } => ResourceKind::TaskManager,
        }
    }

    pub fn validate(&self) -> Result<(), FlinkError> {
        match self {
            Self::Job { job } if job.is_blank() => Err(FlinkError::EmptyResourceId("job")),
            Self::Vertex { job, .. } if job.is_blank() => Err(FlinkError::EmptyResourceId("job")),
            Self::Vertex { vertex, .. } if vertex.is_blank() => Err(FlinkError::EmptyResourceId("vertex")),
            Self::TaskManager { taskmanager } if taskmanager.is_blank() => {
                Err(FlinkError::EmptyResourceId("taskmanager"))
            },
            _ => Ok(()),
        }
    }

    /// Path segments of the resource's metrics endpoint, relative to the JobManager endpoint.
    pub fn metrics_path(&self) -> Vec<&str> {
        match self {
            Self::Job { job } => vec!["jobs", job.as_ref(), "metrics"],
            Self::Vertex { job, vertex } => vec!["jobs", job.as_ref(), "vertices", vertex.as_ref(), "metrics"],
            Self::TaskManager { taskmanager } => vec!["taskmanagers", taskmanager.as_ref(), "metrics"],
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job { job } => write!(f, "job {job}"),
            Self::Vertex { job, vertex } => write!(f, "vertex {vertex} of job {job}"),
            Self::TaskManager { taskmanager } => write!(f, "taskmanager {taskmanager}"),
        }
    }
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobState {
    Initializing,
    Created,
    Running,
    Failing,
    Failed,
    Cancelling,
    Canceled,
    Finished,
    Restarting,
    Suspended,
    Reconciling,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Finished | Self::Failed | Self::Canceled | Self::Suspended)
    }
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskState {
    Scheduled,
    Created,
    Running,
    Failed,
    Canceling,
    Canceled,
    Finished,
    Deploying,
    Reconciling,
    Initializing,
    #[serde(other)]
    Unknown,
}

/// Server-reported backpressure level, ordered by severity.
#[derive(
    Debug, Display, EnumString, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackpressureLevel {
    Ok,
    Low,
    High,
}

impl BackpressureLevel {
    /// Flink's own bucketing of a backpressured-time ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 0.10 {
            Self::Ok
        } else if ratio <= 0.50 {
            Self::Low
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClusterOverview {
    pub taskmanagers: usize,
    pub slots_total: usize,
    pub slots_available: usize,
    pub jobs_running: usize,
    pub jobs_finished: usize,
    pub jobs_cancelled: usize,
    pub jobs_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flink_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsOverview {
    #[serde(default)]
    pub jobs: Vec<JobOverview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOverview {
    pub jid: JobId,
    pub name: String,
    pub state: JobState,
    #[serde(default, alias = "start-time", deserialize_with = "deserialize_opt_millis")]
    pub start_time: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_millis")]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub jid: JobId,
    pub name: String,
    pub state: JobState,
    #[serde(default, alias = "start-time", deserialize_with = "deserialize_opt_millis")]
    pub start_time: Option<i64>,
    #[serde(default, alias = "end-time", deserialize_with = "deserialize_opt_millis")]
    pub end_time: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_millis")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub vertices: Vec<VertexDetail>,
    #[serde(default, alias = "status-counts")]
    pub status_counts: HashMap<TaskState, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexDetail {
    pub id: VertexId,
    pub name: String,
    #[serde(default)]
    pub parallelism: usize,
    pub status: TaskState,
    #[serde(default, alias = "start-time", deserialize_with = "deserialize_opt_millis")]
    pub start_time: Option<i64>,
    #[serde(default, alias = "end-time", deserialize_with = "deserialize_opt_millis")]
    pub end_time: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_millis")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub tasks: HashMap<TaskState, usize>,
    /// Raw vertex IO metrics; values are normalized before use.
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub jid: Option<JobId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "execution-config")]
    pub execution_config: Option<ExecutionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutionConfig {
    pub execution_mode: Option<String>,
    pub restart_strategy: Option<String>,
    pub job_parallelism: Option<i64>,
    pub object_reuse_mode: Option<bool>,
    pub user_config: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExceptions {
    #[serde(default, rename = "root-exception")]
    pub root_exception: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "all-exceptions")]
    pub all_exceptions: Vec<ExceptionInfo>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, rename = "exceptionHistory")]
    pub exception_history: Option<ExceptionHistory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionInfo {
    pub exception: String,
    pub task: Option<String>,
    pub location: Option<String>,
    pub endpoint: Option<String>,
    #[serde(rename = "taskManagerId")]
    pub task_manager_id: Option<String>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionHistory {
    pub entries: Vec<ExceptionHistoryEntry>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExceptionHistoryEntry {
    pub exception_name: String,
    pub stacktrace: Option<String>,
    pub timestamp: Option<i64>,
    pub task_name: Option<String>,
    pub endpoint: Option<String>,
    pub task_manager_id: Option<String>,
    pub concurrent_exceptions: Vec<ExceptionHistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskManagersOverview {
    #[serde(default)]
    pub taskmanagers: Vec<TaskManagerSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskManagerSummary {
    pub id: TaskManagerId,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub data_port: Option<u16>,
    #[serde(default)]
    pub time_since_last_heartbeat: Option<i64>,
    #[serde(default)]
    pub slots_number: Option<i64>,
    #[serde(default)]
    pub free_slots: Option<i64>,
    #[serde(default)]
    pub total_resource: Option<ResourceProfile>,
    #[serde(default)]
    pub free_resource: Option<ResourceProfile>,
    #[serde(default)]
    pub hardware: Option<Hardware>,
    #[serde(default)]
    pub memory_configuration: Option<MemoryConfiguration>,
}

/// Resource profile of a taskmanager; memory values are reported in megabytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceProfile {
    pub cpu_cores: Option<f64>,
    pub task_heap_memory: Option<i64>,
    pub task_off_heap_memory: Option<i64>,
    pub managed_memory: Option<i64>,
    pub network_memory: Option<i64>,
}

impl ResourceProfile {
    pub const BYTES_PER_MB: i64 = 1024 * 1024;

    pub fn mb_as_bytes(mb: Option<i64>) -> Option<i64> {
        mb.and_then(|m| m.checked_mul(Self::BYTES_PER_MB))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Hardware {
    pub cpu_cores: Option<i64>,
    pub physical_memory: Option<i64>,
    pub free_memory: Option<i64>,
    pub managed_memory: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfiguration {
    pub framework_heap: Option<i64>,
    pub task_heap: Option<i64>,
    pub framework_off_heap: Option<i64>,
    pub task_off_heap: Option<i64>,
    pub network_memory: Option<i64>,
    pub managed_memory: Option<i64>,
    pub jvm_metaspace: Option<i64>,
    pub jvm_overhead: Option<i64>,
    pub total_flink_memory: Option<i64>,
    pub total_process_memory: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskManagerDetail {
    #[serde(flatten)]
    pub summary: TaskManagerSummary,
    #[serde(default)]
    pub metrics: Option<TaskManagerDetailMetrics>,
    #[serde(default)]
    pub allocated_slots: Vec<AllocatedSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskManagerDetailMetrics {
    pub heap_used: Option<i64>,
    pub heap_committed: Option<i64>,
    pub heap_max: Option<i64>,
    pub non_heap_used: Option<i64>,
    pub non_heap_committed: Option<i64>,
    pub non_heap_max: Option<i64>,
    pub direct_count: Option<i64>,
    pub direct_used: Option<i64>,
    pub direct_max: Option<i64>,
    pub memory_segments_available: Option<i64>,
    pub memory_segments_total: Option<i64>,
    pub netty_shuffle_memory_segments_available: Option<i64>,
    pub netty_shuffle_memory_segments_used: Option<i64>,
    pub netty_shuffle_memory_segments_total: Option<i64>,
    pub netty_shuffle_memory_available: Option<i64>,
    pub netty_shuffle_memory_used: Option<i64>,
    pub netty_shuffle_memory_total: Option<i64>,
    pub garbage_collectors: Vec<GarbageCollector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GarbageCollector {
    pub name: String,
    pub count: Option<i64>,
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AllocatedSlot {
    pub index: Option<i64>,
    pub job_id: Option<JobId>,
    pub resource: Option<ResourceProfile>,
}

/// Vertex backpressure sample. Ratios are left raw for the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackpressureReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "backpressureLevel", alias = "backpressure-level")]
    pub backpressure_level: Option<String>,
    #[serde(default, rename = "end-timestamp", deserialize_with = "deserialize_opt_millis")]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskBackpressure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtaskBackpressure {
    pub subtask: usize,
    #[serde(rename = "backpressureLevel", alias = "backpressure-level")]
    pub backpressure_level: Option<String>,
    pub ratio: Option<serde_json::Value>,
    #[serde(rename = "idleRatio")]
    pub idle_ratio: Option<serde_json::Value>,
    #[serde(rename = "busyRatio")]
    pub busy_ratio: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarsOverview {
    #[serde(default)]
    pub files: Vec<JarFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarFile {
    pub id: JarId,
    pub name: String,
    #[serde(default)]
    pub uploaded: Option<i64>,
    #[serde(default)]
    pub entry: Vec<JarEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One `{id, value}` element of a Flink metrics response; `value` may be a number, numeric
/// string, null or missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetricPoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl RawMetricPoint {
    pub fn new(id: impl Into<String>, value: Option<serde_json::Value>) -> Self {
        Self { id: id.into(), value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlinkMetricResponse(pub Vec<RawMetricPoint>);

impl IntoIterator for FlinkMetricResponse {
    type IntoIter = std::vec::IntoIter<Self::Item>;
    type Item = RawMetricPoint;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Flink reports unset times as `-1`.
fn deserialize_opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<i64>::deserialize(deserializer)?;
    Ok(millis.filter(|m| 0 <= *m))
}
