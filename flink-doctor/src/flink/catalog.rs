use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Semantic kind of a catalog metric, which drives both coercion and display.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    /// milliseconds
    Duration,
    ByteCount,
    /// unitless fraction, typically in [0, 1]
    Ratio,
    Counter,
    /// epoch milliseconds
    Timestamp,
    Opaque,
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Job,
    Vertex,
    TaskManager,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub kind: MetricKind,
}

const fn spec(name: &'static str, kind: MetricKind) -> MetricSpec {
    MetricSpec { name, kind }
}

pub const MC_JOB__UPTIME: &str = "uptime";
pub const MC_JOB__NR_RESTARTS: &str = "numRestarts";
pub const MC_JOB__TOTAL_CHECKPOINTS: &str = "totalNumberOfCheckpoints";
pub const MC_JOB__COMPLETED_CHECKPOINTS: &str = "numberOfCompletedCheckpoints";
pub const MC_JOB__FAILED_CHECKPOINTS: &str = "numberOfFailedCheckpoints";
pub const MC_JOB__LAST_CHECKPOINT_DURATION: &str = "lastCheckpointDuration";
pub const MC_JOB__LAST_CHECKPOINT_EXTERNAL_PATH: &str = "lastCheckpointExternalPath";

pub const MC_VERTEX__BACKPRESSURE_LEVEL: &str = "backpressureLevel";

pub const MC_TM__SLOTS: &str = "slotsNumber";
pub const MC_TM__FREE_SLOTS: &str = "freeSlots";
pub const MC_TM__CPU_CORES: &str = "hardware.cpuCores";
pub const MC_TM__PHYSICAL_MEMORY: &str = "hardware.physicalMemory";
pub const MC_TM__FREE_MEMORY: &str = "hardware.freeMemory";
pub const MC_TM__HEAP_USED: &str = "Status.JVM.Memory.Heap.Used";
pub const MC_TM__HEAP_MAX: &str = "Status.JVM.Memory.Heap.Max";

static JOB_METRICS: &[MetricSpec] = &[
    spec(MC_JOB__UPTIME, MetricKind::Duration),
    spec("runningTime", MetricKind::Duration),
    spec("downtime", MetricKind::Duration),
    spec("initializingTime", MetricKind::Duration),
    spec("deployingTime", MetricKind::Duration),
    spec("restartingTime", MetricKind::Duration),
    spec("failingTime", MetricKind::Duration),
    spec("cancellingTime", MetricKind::Duration),
    spec(MC_JOB__NR_RESTARTS, MetricKind::Counter),
    spec("fullRestarts", MetricKind::Counter),
    spec(MC_JOB__TOTAL_CHECKPOINTS, MetricKind::Counter),
    spec(MC_JOB__COMPLETED_CHECKPOINTS, MetricKind::Counter),
    spec(MC_JOB__FAILED_CHECKPOINTS, MetricKind::Counter),
    spec("numberOfInProgressCheckpoints", MetricKind::Counter),
    spec("lastCompletedCheckpointId", MetricKind::Opaque),
    spec(MC_JOB__LAST_CHECKPOINT_DURATION, MetricKind::Duration),
    spec("lastCheckpointSize", MetricKind::ByteCount),
    spec("lastCheckpointFullSize", MetricKind::ByteCount),
    spec("lastCheckpointPersistedData", MetricKind::ByteCount),
    spec("lastCheckpointProcessedData", MetricKind::ByteCount),
    spec("lastCheckpointRestoreTimestamp", MetricKind::Timestamp),
    spec(MC_JOB__LAST_CHECKPOINT_EXTERNAL_PATH, MetricKind::Opaque),
    spec("createdTime", MetricKind::Timestamp),
];

static VERTEX_METRICS: &[MetricSpec] = &[
    spec(MC_VERTEX__BACKPRESSURE_LEVEL, MetricKind::Opaque),
    spec("ratio", MetricKind::Ratio),
    spec("idleRatio", MetricKind::Ratio),
    spec("busyRatio", MetricKind::Ratio),
    spec("read-records", MetricKind::Counter),
    spec("write-records", MetricKind::Counter),
    spec("read-bytes", MetricKind::ByteCount),
    spec("write-bytes", MetricKind::ByteCount),
    spec("accumulated-backpressured-time", MetricKind::Duration),
    spec("accumulated-idle-time", MetricKind::Duration),
    spec("accumulated-busy-time", MetricKind::Duration),
];

static TASKMANAGER_METRICS: &[MetricSpec] = &[
    spec(MC_TM__SLOTS, MetricKind::Counter),
    spec(MC_TM__FREE_SLOTS, MetricKind::Counter),
    spec(MC_TM__CPU_CORES, MetricKind::Counter),
    spec(MC_TM__PHYSICAL_MEMORY, MetricKind::ByteCount),
    spec(MC_TM__FREE_MEMORY, MetricKind::ByteCount),
    spec(MC_TM__HEAP_USED, MetricKind::ByteCount),
    spec("Status.JVM.Memory.Heap.Committed", MetricKind::ByteCount),
    spec(MC_TM__HEAP_MAX, MetricKind::ByteCount),
    spec("Status.JVM.Memory.NonHeap.Used", MetricKind::ByteCount),
    spec("Status.JVM.Memory.NonHeap.Committed", MetricKind::ByteCount),
    spec("Status.JVM.Memory.NonHeap.Max", MetricKind::ByteCount),
    spec("Status.JVM.Memory.Direct.MemoryUsed", MetricKind::ByteCount),
    spec("Status.JVM.Memory.Direct.TotalCapacity", MetricKind::ByteCount),
    spec("Status.JVM.Memory.Direct.Count", MetricKind::Counter),
    spec("Status.JVM.Memory.Metaspace.Used", MetricKind::ByteCount),
    spec("Status.JVM.CPU.Load", MetricKind::Ratio),
    spec("Status.JVM.Threads.Count", MetricKind::Counter),
    spec("Status.Flink.Memory.Managed.Used", MetricKind::ByteCount),
    spec("Status.Flink.Memory.Managed.Total", MetricKind::ByteCount),
    spec("Status.Network.AvailableMemorySegments", MetricKind::Counter),
    spec("Status.Network.TotalMemorySegments", MetricKind::Counter),
    spec("Status.Shuffle.Netty.UsedMemory", MetricKind::ByteCount),
    spec("Status.Shuffle.Netty.TotalMemory", MetricKind::ByteCount),
];

/// Fixed set of metrics of interest for one kind of resource, in declaration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MetricCatalog {
    resource: ResourceKind,
    specs: &'static [MetricSpec],
}

impl MetricCatalog {
    pub const fn for_resource(resource: ResourceKind) -> Self {
        let specs = match resource {
            ResourceKind::Job => JOB_METRICS,
            ResourceKind::Vertex => VERTEX_METRICS,
            ResourceKind::TaskManager => TASKMANAGER_METRICS,
        };

        Self { resource, specs }
    }

    pub const fn job() -> Self {
        Self::for_resource(ResourceKind::Job)
    }

    pub const fn vertex() -> Self {
        Self::for_resource(ResourceKind::Vertex)
    }

    pub const fn taskmanager() -> Self {
        Self::for_resource(ResourceKind::TaskManager)
    }

    pub const fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub const fn specs(&self) -> &'static [MetricSpec] {
        self.specs
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.name).collect()
    }

    /// Kind of the named metric, if the catalog declares it.
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.specs.iter().find(|s| s.name == name).map(|s| s.kind)
    }

    /// Kind used when normalizing an arbitrary metric id. Names outside the catalog are
    /// guessed from Flink's naming conventions.
    pub fn kind_or_infer(&self, name: &str) -> MetricKind {
        self.kind_of(name).unwrap_or_else(|| infer_kind(name))
    }
}

fn infer_kind(name: &str) -> MetricKind {
    if name.contains("Memory") || name.ends_with("Bytes") || name.ends_with("Size") {
        MetricKind::ByteCount
    } else if name.contains("CPU.Load") || name.contains("Ratio") {
        MetricKind::Ratio
    } else if name.contains("Count") || name.contains("Segments") || name.starts_with("num") {
        MetricKind::Counter
    } else if name.ends_with("Time") || name.ends_with("Duration") {
        MetricKind::Duration
    } else {
        MetricKind::Opaque
    }
}
