use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use crate::flink::{
    MC_JOB__COMPLETED_CHECKPOINTS, MC_JOB__FAILED_CHECKPOINTS, MC_JOB__TOTAL_CHECKPOINTS, MC_TM__FREE_MEMORY,
    MC_TM__FREE_SLOTS, MC_TM__HEAP_MAX, MC_TM__HEAP_USED, MC_TM__PHYSICAL_MEMORY, MC_TM__SLOTS,
};
use crate::math;
use crate::phases::normalize::MetricIndex;

/// Ratios derived from a snapshot. Each is absent when its inputs are absent or its denominator is
/// not positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedSummary {
    pub checkpoint_success_ratio: Option<f64>,
    pub checkpoint_failure_ratio: Option<f64>,
    pub slot_utilization: Option<f64>,
    pub heap_utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
    pub max_backpressure_ratio: Option<f64>,
    pub backpressure_spread: Option<f64>,
}

impl DerivedSummary {
    pub fn derive(metrics: &MetricIndex) -> Self {
        Self {
            checkpoint_success_ratio: checkpoint_ratio(metrics, MC_JOB__COMPLETED_CHECKPOINTS),
            checkpoint_failure_ratio: checkpoint_ratio(metrics, MC_JOB__FAILED_CHECKPOINTS),
            slot_utilization: slot_utilization(metrics),
            heap_utilization: heap_utilization(metrics),
            memory_utilization: memory_utilization(metrics),
            max_backpressure_ratio: subtask_ratios(metrics).into_iter().reduce(f64::max),
            backpressure_spread: backpressure_spread(metrics),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn checkpoint_ratio(metrics: &MetricIndex, numerator: &str) -> Option<f64> {
    math::ratio(metrics.value(numerator)?, metrics.value(MC_JOB__TOTAL_CHECKPOINTS)?)
}

pub(super) fn slot_utilization(metrics: &MetricIndex) -> Option<f64> {
    let total = metrics.value(MC_TM__SLOTS)?;
    let free = metrics.value(MC_TM__FREE_SLOTS)?;
    math::ratio(total - free, total)
}

pub(super) fn heap_utilization(metrics: &MetricIndex) -> Option<f64> {
    math::ratio(metrics.value(MC_TM__HEAP_USED)?, metrics.value(MC_TM__HEAP_MAX)?)
}

pub(super) fn memory_utilization(metrics: &MetricIndex) -> Option<f64> {
    let physical = metrics.value(MC_TM__PHYSICAL_MEMORY)?;
    let free = metrics.value(MC_TM__FREE_MEMORY)?;
    math::ratio(physical - free, physical)
}

pub(super) fn subtask_ratios(metrics: &MetricIndex) -> Vec<f64> {
    metrics.subtasks().iter().filter_map(|s| s.ratio).collect()
}

/// `max - min` of subtask backpressure ratios; needs at least two numeric ratios.
pub(super) fn backpressure_spread(metrics: &MetricIndex) -> Option<f64> {
    match subtask_ratios(metrics).into_iter().minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::MinMax(min, max) => Some(max - min),
        _ => None,
    }
}
