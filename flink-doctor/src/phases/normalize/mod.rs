//! Strict coercion boundary between Flink's loosely typed JSON and the diagnostic rules. Nothing
//! downstream of this module inspects a `serde_json::Value`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::flink::{
    BackpressureLevel, BackpressureReport, MetricCatalog, MetricKind, RawMetricPoint, TaskManagerDetailMetrics,
    TaskManagerSummary, VertexDetail, MC_TM__CPU_CORES, MC_TM__FREE_MEMORY, MC_TM__FREE_SLOTS, MC_TM__HEAP_MAX,
    MC_TM__HEAP_USED, MC_TM__PHYSICAL_MEMORY, MC_TM__SLOTS, MC_VERTEX__BACKPRESSURE_LEVEL,
};

mod format;

pub use format::{
    format_bytes, format_duration, format_metric, format_opt_percent, format_percent, format_timestamp, scale_bytes,
    NOT_AVAILABLE,
};

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Numeric {
    Integer(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(_) => None,
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Normalized metric. `numeric`, when present, is finite; absence means unavailable, not zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedMetric {
    pub id: String,
    pub kind: MetricKind,
    pub numeric: Option<Numeric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TypedMetric {
    pub fn value(&self) -> Option<f64> {
        self.numeric.map(|n| n.as_f64())
    }

    pub const fn is_available(&self) -> bool {
        self.numeric.is_some() || self.text.is_some()
    }
}

/// Coerce a raw JSON value. Numbers pass through; numeric strings parse, collapsing
/// integer-valued floats to integers; everything else is absent.
pub fn coerce_numeric(value: Option<&Value>) -> Option<Numeric> {
    match value? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Numeric::Integer(i))
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(Numeric::Float)
            }
        },
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

fn parse_numeric(rep: &str) -> Option<Numeric> {
    let rep = rep.trim();
    if rep.is_empty() {
        return None;
    }

    let parsed = f64::from_str(rep).ok().filter(|f| f.is_finite())?;
    if parsed.fract() == 0.0 && (i64::MIN as f64) <= parsed && parsed < (i64::MAX as f64) {
        Some(Numeric::Integer(parsed as i64))
    } else {
        Some(Numeric::Float(parsed))
    }
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn normalize(point: &RawMetricPoint, kind: MetricKind) -> TypedMetric {
    let value = point.value.as_ref();
    let text = if kind == MetricKind::Opaque { coerce_text(value) } else { None };

    TypedMetric {
        id: point.id.clone(),
        kind,
        numeric: coerce_numeric(value),
        text,
    }
}

/// Per-subtask backpressure sample after coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubtaskMetrics {
    pub subtask: usize,
    pub level: Option<BackpressureLevel>,
    pub ratio: Option<f64>,
    pub idle_ratio: Option<f64>,
    pub busy_ratio: Option<f64>,
}

impl SubtaskMetrics {
    /// The reported level, or Flink's bucketing of the ratio when no level was reported.
    pub fn effective_level(&self) -> Option<BackpressureLevel> {
        self.level.or_else(|| self.ratio.map(BackpressureLevel::from_ratio))
    }
}

/// Typed metric mapping every diagnostic rule evaluates against.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricIndex {
    metrics: HashMap<String, TypedMetric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subtasks: Vec<SubtaskMetrics>,
}

impl MetricIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts of the same id replace earlier ones.
    pub fn insert(&mut self, metric: TypedMetric) {
        if let Some(prior) = self.metrics.insert(metric.id.clone(), metric) {
            tracing::debug!(id=%prior.id, "duplicate metric id - last seen wins");
        }
    }

    pub fn insert_integer(&mut self, id: &str, kind: MetricKind, value: Option<i64>) {
        self.insert(TypedMetric {
            id: id.to_string(),
            kind,
            numeric: value.map(Numeric::Integer),
            text: None,
        });
    }

    pub fn get(&self, id: &str) -> Option<&TypedMetric> {
        self.metrics.get(id)
    }

    pub fn value(&self, id: &str) -> Option<f64> {
        self.get(id).and_then(TypedMetric::value)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(|m| m.text.as_deref())
    }

    pub fn subtasks(&self) -> &[SubtaskMetrics] {
        self.subtasks.as_slice()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.subtasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedMetric> {
        self.metrics.values()
    }

    /// Metrics in the order of `ids`, skipping ids not in the index.
    pub fn ordered<'a, I>(&'a self, ids: I) -> Vec<&'a TypedMetric>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }
}

/// Index raw points by id, typing each with the catalog's declared kind. Ids outside the catalog
/// are `Opaque`.
pub fn index_by_id<'p, P>(points: P, catalog: &MetricCatalog) -> MetricIndex
where
    P: IntoIterator<Item = &'p RawMetricPoint>,
{
    index_with(points, |id| catalog.kind_of(id).unwrap_or(MetricKind::Opaque))
}

/// Like [`index_by_id`], but ids outside the catalog are typed from their names.
pub fn index_by_name<'p, P>(points: P, catalog: &MetricCatalog) -> MetricIndex
where
    P: IntoIterator<Item = &'p RawMetricPoint>,
{
    index_with(points, |id| catalog.kind_or_infer(id))
}

fn index_with<'p, P, K>(points: P, kind_for: K) -> MetricIndex
where
    P: IntoIterator<Item = &'p RawMetricPoint>,
    K: Fn(&str) -> MetricKind,
{
    let mut index = MetricIndex::new();
    for point in points {
        index.insert(normalize(point, kind_for(point.id.as_str())));
    }
    index
}

pub fn normalize_backpressure(report: &BackpressureReport) -> MetricIndex {
    let mut index = MetricIndex::new();
    let level = report.backpressure_level.as_ref().map(|l| Value::String(l.clone()));
    index.insert(normalize(
        &RawMetricPoint::new(MC_VERTEX__BACKPRESSURE_LEVEL, level),
        MetricKind::Opaque,
    ));

    index.subtasks = report
        .subtasks
        .iter()
        .map(|s| SubtaskMetrics {
            subtask: s.subtask,
            level: s
                .backpressure_level
                .as_deref()
                .and_then(|l| BackpressureLevel::from_str(l.trim()).ok()),
            ratio: coerce_ratio(s.ratio.as_ref()),
            idle_ratio: coerce_ratio(s.idle_ratio.as_ref()),
            busy_ratio: coerce_ratio(s.busy_ratio.as_ref()),
        })
        .collect();

    index
}

fn coerce_ratio(value: Option<&Value>) -> Option<f64> {
    coerce_numeric(value).map(|n| n.as_f64())
}

/// Vertex IO metrics from a job detail; `*-complete` flags are dropped.
pub fn normalize_vertex(vertex: &VertexDetail) -> MetricIndex {
    let catalog = MetricCatalog::vertex();
    let mut index = MetricIndex::new();
    for (id, value) in vertex.metrics.iter().filter(|(id, _)| !id.ends_with("-complete")) {
        let point = RawMetricPoint::new(id.clone(), Some(value.clone()));
        index.insert(normalize(&point, catalog.kind_of(id).unwrap_or(MetricKind::Opaque)));
    }
    index
}

/// Taskmanager capacity fields from the taskmanager listing or detail, plus detail heap metrics
/// when available.
pub fn normalize_taskmanager(summary: &TaskManagerSummary, metrics: Option<&TaskManagerDetailMetrics>) -> MetricIndex {
    let mut index = MetricIndex::new();
    index.insert_integer(MC_TM__SLOTS, MetricKind::Counter, summary.slots_number);
    index.insert_integer(MC_TM__FREE_SLOTS, MetricKind::Counter, summary.free_slots);

    let hardware = summary.hardware.as_ref();
    index.insert_integer(MC_TM__CPU_CORES, MetricKind::Counter, hardware.and_then(|h| h.cpu_cores));
    index.insert_integer(
        MC_TM__PHYSICAL_MEMORY,
        MetricKind::ByteCount,
        hardware.and_then(|h| h.physical_memory),
    );
    index.insert_integer(MC_TM__FREE_MEMORY, MetricKind::ByteCount, hardware.and_then(|h| h.free_memory));

    if let Some(m) = metrics {
        index.insert_integer(MC_TM__HEAP_USED, MetricKind::ByteCount, m.heap_used);
        index.insert_integer(MC_TM__HEAP_MAX, MetricKind::ByteCount, m.heap_max);
    }

    index
}

/// Merge `other` into `self`; `other` wins on duplicate ids.
impl Extend<TypedMetric> for MetricIndex {
    fn extend<T: IntoIterator<Item = TypedMetric>>(&mut self, iter: T) {
        for metric in iter {
            self.insert(metric);
        }
    }
}
