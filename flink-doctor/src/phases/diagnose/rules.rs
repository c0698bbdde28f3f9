use std::str::FromStr;

use super::summary;
use super::{DiagnosticRule, Verdict};
use crate::flink::{
    BackpressureLevel, ResourceRef, MC_JOB__COMPLETED_CHECKPOINTS, MC_JOB__FAILED_CHECKPOINTS,
    MC_JOB__LAST_CHECKPOINT_DURATION, MC_JOB__LAST_CHECKPOINT_EXTERNAL_PATH, MC_JOB__NR_RESTARTS,
    MC_JOB__TOTAL_CHECKPOINTS, MC_JOB__UPTIME, MC_TM__CPU_CORES, MC_TM__SLOTS, MC_VERTEX__BACKPRESSURE_LEVEL,
};
use crate::math;
use crate::phases::normalize::{format_duration, format_percent, MetricIndex};

const MIN_CHECKPOINTS_FOR_RATIO: f64 = 5.0;
const CHECKPOINT_FAILURE_RATIO_THRESHOLD: f64 = 0.30;
const STALE_UPTIME_MILLIS: f64 = 10.0 * 60.0 * 1_000.0;
const RESTART_THRESHOLD: f64 = 3.0;
const SLOW_CHECKPOINT_MILLIS: f64 = 60_000.0;
const SKEW_SPREAD_THRESHOLD: f64 = 0.30;
const SATURATION_THRESHOLD: f64 = 0.90;

/// The full rule set in evaluation order.
pub fn standard_rules() -> Vec<Box<dyn DiagnosticRule>> {
    vec![
        Box::new(CheckpointFailureRatioRule),
        Box::new(StaleCheckpointingRule),
        Box::new(RestartInstabilityRule),
        Box::new(SlowCheckpointRule),
        Box::new(CheckpointNotExternalizedRule),
        Box::new(BackpressureRule),
        Box::new(DataSkewRule),
        Box::new(SlotSaturationRule),
        Box::new(HeapSaturationRule),
        Box::new(MemorySaturationRule),
        Box::new(CpuSlotMismatchRule),
    ]
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CheckpointFailureRatioRule;

impl DiagnosticRule for CheckpointFailureRatioRule {
    fn name(&self) -> &'static str {
        "checkpoint_failure_ratio"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let total = metrics.value(MC_JOB__TOTAL_CHECKPOINTS)?;
        let failed = metrics.value(MC_JOB__FAILED_CHECKPOINTS)?;
        if !math::reaches(total, MIN_CHECKPOINTS_FOR_RATIO) {
            return None;
        }

        let failure_ratio = math::ratio(failed, total)?;
        math::exceeds(failure_ratio, CHECKPOINT_FAILURE_RATIO_THRESHOLD).then(|| {
            Verdict::critical(format!(
                "checkpoint failure ratio exceeds 30%: {failed} of {total} checkpoints failed ({}); investigate \
                 operator backpressure, I/O sinks, or checkpoint timeout settings",
                format_percent(failure_ratio),
            ))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StaleCheckpointingRule;

impl DiagnosticRule for StaleCheckpointingRule {
    fn name(&self) -> &'static str {
        "stale_checkpointing"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let uptime = metrics.value(MC_JOB__UPTIME)?;
        let completed = metrics.value(MC_JOB__COMPLETED_CHECKPOINTS)?;

        (math::exceeds(uptime, STALE_UPTIME_MILLIS) && completed == 0.0).then(|| {
            Verdict::warn(format!(
                "checkpointing appears inactive: no completed checkpoints after {} uptime; verify checkpointing is \
                 enabled and the state backend storage is reachable",
                format_duration(uptime)
            ))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RestartInstabilityRule;

impl DiagnosticRule for RestartInstabilityRule {
    fn name(&self) -> &'static str {
        "restart_instability"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let restarts = metrics.value(MC_JOB__NR_RESTARTS)?;
        math::reaches(restarts, RESTART_THRESHOLD).then(|| {
            Verdict::warn(format!(
                "repeated restarts observed ({restarts} restarts); review taskmanager and jobmanager logs for \
                 exceptions or OOMs"
            ))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SlowCheckpointRule;

impl DiagnosticRule for SlowCheckpointRule {
    fn name(&self) -> &'static str {
        "slow_checkpoint"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let duration = metrics.value(MC_JOB__LAST_CHECKPOINT_DURATION)?;
        math::exceeds(duration, SLOW_CHECKPOINT_MILLIS).then(|| {
            Verdict::warn(format!(
                "checkpoint duration exceeds 60s (last took {}); consider tuning the state backend or I/O throughput",
                format_duration(duration)
            ))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CheckpointNotExternalizedRule;

impl DiagnosticRule for CheckpointNotExternalizedRule {
    fn name(&self) -> &'static str {
        "checkpoint_not_externalized"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let completed = metrics.value(MC_JOB__COMPLETED_CHECKPOINTS)?;
        let external_path = metrics.text(MC_JOB__LAST_CHECKPOINT_EXTERNAL_PATH);

        (0.0 < completed && external_path.is_none()).then(|| {
            Verdict::advisory(
                "completed checkpoints have no externalized path; check externalization settings if retained \
                 checkpoints are expected",
            )
        })
    }
}

/// Worst of the vertex-reported level and every subtask level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BackpressureRule;

impl DiagnosticRule for BackpressureRule {
    fn name(&self) -> &'static str {
        "backpressure"
    }

    fn evaluate(&self, metrics: &MetricIndex, subject: &ResourceRef) -> Option<Verdict> {
        let vertex_level = metrics
            .text(MC_VERTEX__BACKPRESSURE_LEVEL)
            .and_then(|level| BackpressureLevel::from_str(level).ok());

        let worst = metrics
            .subtasks()
            .iter()
            .filter_map(|s| s.effective_level())
            .chain(vertex_level)
            .max()?;

        match worst {
            BackpressureLevel::High => Some(Verdict::critical(format!(
                "high backpressure on {subject}: the operator is a bottleneck; increase its parallelism, optimize \
                 its logic, or check slow downstream systems"
            ))),
            BackpressureLevel::Low => Some(Verdict::warn(format!(
                "low backpressure on {subject}; monitor whether it is temporary or persistent"
            ))),
            BackpressureLevel::Ok => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DataSkewRule;

impl DiagnosticRule for DataSkewRule {
    fn name(&self) -> &'static str {
        "data_skew"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let spread = summary::backpressure_spread(metrics)?;
        math::exceeds(spread, SKEW_SPREAD_THRESHOLD).then(|| {
            Verdict::warn(format!(
                "data skew detected: subtask backpressure ratios differ by {}; consider rebalancing or \
                 repartitioning the data",
                format_percent(spread)
            ))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SlotSaturationRule;

impl DiagnosticRule for SlotSaturationRule {
    fn name(&self) -> &'static str {
        "slot_saturation"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let utilization = summary::slot_utilization(metrics)?;
        math::reaches(utilization, SATURATION_THRESHOLD)
            .then(|| Verdict::warn(format!("high slot utilization: {}", format_percent(utilization))))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapSaturationRule;

impl DiagnosticRule for HeapSaturationRule {
    fn name(&self) -> &'static str {
        "heap_saturation"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let utilization = summary::heap_utilization(metrics)?;
        math::reaches(utilization, SATURATION_THRESHOLD)
            .then(|| Verdict::critical(format!("heap near capacity: {} used", format_percent(utilization))))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemorySaturationRule;

impl DiagnosticRule for MemorySaturationRule {
    fn name(&self) -> &'static str {
        "memory_saturation"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let utilization = summary::memory_utilization(metrics)?;
        math::reaches(utilization, SATURATION_THRESHOLD).then(|| {
            Verdict::warn(format!(
                "physical memory near capacity: {} used",
                format_percent(utilization)
            ))
        })
    }
}

/// More slots than cores risks oversubscription; fewer is only worth a tip.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CpuSlotMismatchRule;

impl DiagnosticRule for CpuSlotMismatchRule {
    fn name(&self) -> &'static str {
        "cpu_slot_mismatch"
    }

    fn evaluate(&self, metrics: &MetricIndex, _subject: &ResourceRef) -> Option<Verdict> {
        let slots = metrics.value(MC_TM__SLOTS)?;
        let cores = metrics.value(MC_TM__CPU_CORES)?;
        if slots <= 0.0 || cores <= 0.0 {
            return None;
        }

        if math::exceeds(slots, cores) {
            Some(Verdict::warn(format!(
                "potential oversubscription: {slots} slots configured but only {cores} cpu cores available"
            )))
        } else if math::exceeds(cores, slots) {
            Some(Verdict::advisory(format!(
                "{cores} cpu cores but only {slots} slots; consider increasing taskmanager.numberOfTaskSlots"
            )))
        } else {
            None
        }
    }
}
