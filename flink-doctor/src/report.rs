//! Plain-text rendering of the engine's views. Wrap a view in [`Text`] and format it.

use std::fmt;

use crate::engine::{
    BackpressureDiagnosis, ConnectionStatus, JobDiagnosis, JobReport, TaskManagerHealth, TaskManagerMetrics,
    TaskManagerReport, TaskManagersReport, UtilizationBand,
};
use crate::flink::{
    Ack, ClusterOverview, ExceptionHistoryEntry, Hardware, JarFile, JobExceptions, JobOverview, MemoryConfiguration,
    ResourceProfile, TaskManagerDetailMetrics,
};
use crate::phases::diagnose::Assessment;
use crate::phases::normalize::{
    format_bytes, format_duration, format_metric, format_opt_percent, format_percent, format_timestamp, MetricIndex,
    NOT_AVAILABLE,
};

const INDENT: &str = "  ";

/// Text rendering of a view.
pub struct Text<'a, T: ?Sized>(pub &'a T);

fn opt_bytes(bytes: Option<i64>) -> String {
    bytes.map_or_else(|| NOT_AVAILABLE.to_string(), |b| format_bytes(b as f64))
}

fn opt_millis(millis: Option<i64>) -> String {
    millis.map_or_else(|| NOT_AVAILABLE.to_string(), |m| format_duration(m as f64))
}

fn opt_timestamp(millis: Option<i64>) -> String {
    millis.map_or_else(|| NOT_AVAILABLE.to_string(), format_timestamp)
}

fn opt_count(count: Option<i64>) -> String {
    count.map_or_else(|| NOT_AVAILABLE.to_string(), |c| c.to_string())
}

fn opt_text(text: Option<&str>) -> &str {
    text.unwrap_or(NOT_AVAILABLE)
}

fn write_assessment(f: &mut fmt::Formatter<'_>, assessment: &Assessment, indent: &str) -> fmt::Result {
    if assessment.findings.is_empty() && assessment.advisories.is_empty() {
        return writeln!(f, "{indent}no issues detected");
    }

    for finding in assessment.findings.iter() {
        writeln!(f, "{indent}[{}] {}: {}", finding.severity, finding.rule, finding.message)?;
    }

    for advisory in assessment.advisories.iter() {
        writeln!(f, "{indent}tip: {}", advisory.message)?;
    }

    Ok(())
}

fn write_overview(f: &mut fmt::Formatter<'_>, overview: &ClusterOverview) -> fmt::Result {
    if let Some(ref version) = overview.flink_version {
        writeln!(f, "Flink version: {version}")?;
    }
    writeln!(f, "TaskManagers: {}", overview.taskmanagers)?;
    writeln!(f, "Slots: {} total, {} available", overview.slots_total, overview.slots_available)?;
    writeln!(
        f,
        "Jobs: {} running, {} finished, {} cancelled, {} failed",
        overview.jobs_running, overview.jobs_finished, overview.jobs_cancelled, overview.jobs_failed
    )
}

impl fmt::Display for Text<'_, Ack> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "connected to Flink at {}", self.0.endpoint)
    }
}

impl fmt::Display for Text<'_, ConnectionStatus> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.0;
        match (&status.state.endpoint, status.state.initialized) {
            (Some(endpoint), true) => writeln!(f, "connected to {endpoint}")?,
            (Some(endpoint), false) => writeln!(f, "not connected (last endpoint {endpoint})")?,
            (None, _) => writeln!(f, "not connected")?,
        }

        if let Some(ref overview) = status.overview {
            write_overview(f, overview)?;
        }

        if let Some(ref error) = status.overview_error {
            writeln!(f, "cluster overview unavailable: {error}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Text<'_, ClusterOverview> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_overview(f, self.0)
    }
}

impl fmt::Display for Text<'_, [JobOverview]> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No jobs found.");
        }

        for job in self.0.iter() {
            writeln!(f, "{} - {} [{}]", job.jid, job.name, job.state)?;
        }
        Ok(())
    }
}

impl fmt::Display for Text<'_, JobReport> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let job = self.0;
        writeln!(f, "Job: {} ({})", job.name, job.jid)?;
        writeln!(f, "State: {}", job.state)?;
        writeln!(f, "Started: {}", opt_timestamp(job.start_time))?;
        if job.end_time.is_some() {
            writeln!(f, "Ended: {}", opt_timestamp(job.end_time))?;
        }
        writeln!(f, "Duration: {}", opt_millis(job.duration))?;
        writeln!(f, "Total parallelism: {}", job.total_parallelism)?;
        writeln!(f, "Failed tasks: {}", job.failed_tasks)?;

        match (&job.config, &job.config_error) {
            (Some(config), _) => {
                writeln!(f, "Execution config:")?;
                writeln!(f, "{INDENT}mode: {}", opt_text(config.execution_mode.as_deref()))?;
                writeln!(f, "{INDENT}restart strategy: {}", opt_text(config.restart_strategy.as_deref()))?;
                writeln!(f, "{INDENT}job parallelism: {}", opt_count(config.job_parallelism))?;
            },
            (None, Some(error)) => writeln!(f, "Execution config unavailable: {error}")?,
            (None, None) => (),
        }

        writeln!(f, "Vertices:")?;
        for vertex in job.vertices.iter() {
            writeln!(f, "{INDENT}{} ({}) [{}] parallelism {}", vertex.name, vertex.id, vertex.status, vertex.parallelism)?;
            let inner = format!("{INDENT}{INDENT}");
            writeln!(f, "{inner}duration: {}", opt_millis(vertex.duration))?;
            for id in ["read-records", "write-records", "read-bytes", "write-bytes"] {
                if let Some(metric) = vertex.metrics.get(id) {
                    writeln!(f, "{inner}{id}: {}", format_metric(metric))?;
                }
            }
            if let Some(throughput) = vertex.throughput {
                writeln!(f, "{inner}throughput: {throughput:.2} records/s")?;
            }
        }

        if !job.insights.is_empty() {
            writeln!(f, "Insights:")?;
            for insight in job.insights.iter() {
                writeln!(f, "{INDENT}{insight}")?;
            }
        }

        Ok(())
    }
}

fn write_history_entry(f: &mut fmt::Formatter<'_>, entry: &ExceptionHistoryEntry, indent: &str) -> fmt::Result {
    writeln!(
        f,
        "{indent}{} at {} (task: {}, taskmanager: {})",
        entry.exception_name,
        opt_timestamp(entry.timestamp),
        opt_text(entry.task_name.as_deref()),
        opt_text(entry.task_manager_id.as_deref()),
    )
}

impl fmt::Display for Text<'_, JobExceptions> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exceptions = self.0;
        let history = exceptions.exception_history.as_ref().map(|h| h.entries.as_slice()).unwrap_or_default();

        if exceptions.root_exception.is_none() && exceptions.all_exceptions.is_empty() && history.is_empty() {
            return writeln!(f, "No exceptions found.");
        }

        if let Some(ref root) = exceptions.root_exception {
            writeln!(f, "Root cause ({}):", opt_timestamp(exceptions.timestamp))?;
            for line in root.lines() {
                writeln!(f, "{INDENT}{line}")?;
            }
        }

        if !exceptions.all_exceptions.is_empty() {
            writeln!(f, "All exceptions:")?;
            for info in exceptions.all_exceptions.iter() {
                let headline = info.exception.lines().next().unwrap_or_default();
                writeln!(
                    f,
                    "{INDENT}{headline} (task: {}, location: {})",
                    opt_text(info.task.as_deref()),
                    opt_text(info.location.as_deref().or(info.endpoint.as_deref())),
                )?;
            }
        }

        if !history.is_empty() {
            writeln!(f, "Exception history:")?;
            for entry in history.iter() {
                write_history_entry(f, entry, INDENT)?;
                for concurrent in entry.concurrent_exceptions.iter() {
                    write_history_entry(f, concurrent, &format!("{INDENT}{INDENT}concurrent: "))?;
                }
            }
        }

        let truncated = exceptions.truncated || exceptions.exception_history.as_ref().map_or(false, |h| h.truncated);
        writeln!(
            f,
            "Summary: {} exceptions, {} history entries{}",
            exceptions.all_exceptions.len(),
            history.len(),
            if truncated { " (truncated)" } else { "" }
        )
    }
}

impl fmt::Display for Text<'_, JobDiagnosis> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagnosis = self.0;
        writeln!(f, "Diagnosis of job {} at {}", diagnosis.job, diagnosis.fetched_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Overall: {}", diagnosis.assessment.overall_severity())?;

        writeln!(f, "Metrics:")?;
        if diagnosis.metrics.is_empty() {
            writeln!(f, "{INDENT}no health metrics available")?;
        }
        for metric in diagnosis.metrics.iter() {
            writeln!(f, "{INDENT}{}: {}", metric.id, format_metric(metric))?;
        }

        let summary = &diagnosis.assessment.summary;
        writeln!(f, "Checkpoint success ratio: {}", format_opt_percent(summary.checkpoint_success_ratio))?;
        writeln!(f, "Checkpoint failure ratio: {}", format_opt_percent(summary.checkpoint_failure_ratio))?;

        writeln!(f, "Findings:")?;
        write_assessment(f, &diagnosis.assessment, INDENT)
    }
}

fn write_band(f: &mut fmt::Formatter<'_>, label: &str, ratio: Option<f64>) -> fmt::Result {
    match ratio {
        Some(ratio) => writeln!(
            f,
            "{INDENT}{INDENT}{label}: {} [{}]",
            format_percent(ratio),
            UtilizationBand::from_ratio(ratio)
        ),
        None => writeln!(f, "{INDENT}{INDENT}{label}: {NOT_AVAILABLE}"),
    }
}

fn write_taskmanager_health(f: &mut fmt::Formatter<'_>, tm: &TaskManagerHealth) -> fmt::Result {
    let summary = &tm.summary;
    writeln!(f, "{INDENT}{}", summary.id)?;
    writeln!(
        f,
        "{INDENT}{INDENT}slots: {} total, {} free",
        opt_count(summary.slots_number),
        opt_count(summary.free_slots)
    )?;
    write_band(f, "slot utilization", tm.assessment.summary.slot_utilization)?;
    if let Some(ref hardware) = summary.hardware {
        writeln!(
            f,
            "{INDENT}{INDENT}cpu cores: {}, physical memory: {}",
            opt_count(hardware.cpu_cores),
            opt_bytes(hardware.physical_memory)
        )?;
    }
    write_band(f, "memory utilization", tm.assessment.summary.memory_utilization)?;
    if let Some(heartbeat) = summary.time_since_last_heartbeat {
        writeln!(f, "{INDENT}{INDENT}last heartbeat: {}", format_timestamp(heartbeat))?;
    }
    write_assessment(f, &tm.assessment, &format!("{INDENT}{INDENT}"))
}

impl fmt::Display for Text<'_, TaskManagersReport> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let capacity = &report.capacity;
        writeln!(f, "TaskManagers: {}", report.taskmanagers.len())?;
        writeln!(f, "Total slots: {}", capacity.total_slots)?;
        writeln!(f, "Used slots: {} ({})", capacity.used_slots, format_opt_percent(capacity.used_ratio))?;
        writeln!(f, "Free slots: {} ({})", capacity.free_slots, format_opt_percent(capacity.free_ratio))?;

        for tm in report.taskmanagers.iter() {
            write_taskmanager_health(f, tm)?;
        }

        writeln!(f, "Recommendation: {}", capacity.outlook.recommendation())
    }
}

fn write_hardware(f: &mut fmt::Formatter<'_>, hardware: &Hardware) -> fmt::Result {
    writeln!(f, "Hardware:")?;
    writeln!(f, "{INDENT}cpu cores: {}", opt_count(hardware.cpu_cores))?;
    writeln!(f, "{INDENT}physical memory: {}", opt_bytes(hardware.physical_memory))?;
    writeln!(f, "{INDENT}free memory: {}", opt_bytes(hardware.free_memory))?;
    writeln!(f, "{INDENT}managed memory: {}", opt_bytes(hardware.managed_memory))
}

fn write_resource_profile(f: &mut fmt::Formatter<'_>, label: &str, profile: &ResourceProfile) -> fmt::Result {
    writeln!(f, "{label}:")?;
    let cores = profile.cpu_cores.map_or_else(|| NOT_AVAILABLE.to_string(), |c| format!("{c:.1}"));
    writeln!(f, "{INDENT}cpu cores: {cores}")?;
    writeln!(f, "{INDENT}task heap: {}", opt_bytes(ResourceProfile::mb_as_bytes(profile.task_heap_memory)))?;
    writeln!(
        f,
        "{INDENT}task off-heap: {}",
        opt_bytes(ResourceProfile::mb_as_bytes(profile.task_off_heap_memory))
    )?;
    writeln!(f, "{INDENT}managed: {}", opt_bytes(ResourceProfile::mb_as_bytes(profile.managed_memory)))?;
    writeln!(f, "{INDENT}network: {}", opt_bytes(ResourceProfile::mb_as_bytes(profile.network_memory)))
}

fn write_memory_configuration(f: &mut fmt::Formatter<'_>, memory: &MemoryConfiguration) -> fmt::Result {
    writeln!(f, "Memory configuration:")?;
    let entries = [
        ("framework heap", memory.framework_heap),
        ("task heap", memory.task_heap),
        ("framework off-heap", memory.framework_off_heap),
        ("task off-heap", memory.task_off_heap),
        ("network", memory.network_memory),
        ("managed", memory.managed_memory),
        ("jvm metaspace", memory.jvm_metaspace),
        ("jvm overhead", memory.jvm_overhead),
        ("total flink", memory.total_flink_memory),
        ("total process", memory.total_process_memory),
    ];
    for (label, bytes) in entries {
        writeln!(f, "{INDENT}{label}: {}", opt_bytes(bytes))?;
    }
    Ok(())
}

fn write_detail_metrics(f: &mut fmt::Formatter<'_>, metrics: &TaskManagerDetailMetrics) -> fmt::Result {
    writeln!(f, "Metrics:")?;
    writeln!(
        f,
        "{INDENT}heap: {} used, {} committed, {} max",
        opt_bytes(metrics.heap_used),
        opt_bytes(metrics.heap_committed),
        opt_bytes(metrics.heap_max)
    )?;
    writeln!(
        f,
        "{INDENT}non-heap: {} used, {} committed, {} max",
        opt_bytes(metrics.non_heap_used),
        opt_bytes(metrics.non_heap_committed),
        opt_bytes(metrics.non_heap_max)
    )?;
    writeln!(
        f,
        "{INDENT}direct: {} buffers, {} used, {} max",
        opt_count(metrics.direct_count),
        opt_bytes(metrics.direct_used),
        opt_bytes(metrics.direct_max)
    )?;
    writeln!(
        f,
        "{INDENT}network memory segments: {} available of {}",
        opt_count(metrics.memory_segments_available),
        opt_count(metrics.memory_segments_total)
    )?;
    writeln!(
        f,
        "{INDENT}netty shuffle memory: {} used, {} available, {} total",
        opt_bytes(metrics.netty_shuffle_memory_used),
        opt_bytes(metrics.netty_shuffle_memory_available),
        opt_bytes(metrics.netty_shuffle_memory_total)
    )?;
    for gc in metrics.garbage_collectors.iter() {
        writeln!(
            f,
            "{INDENT}gc {}: {} collections, {}",
            gc.name,
            opt_count(gc.count),
            opt_millis(gc.time)
        )?;
    }
    Ok(())
}

impl fmt::Display for Text<'_, TaskManagerReport> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let summary = &report.detail.summary;
        writeln!(f, "TaskManager: {}", summary.id)?;
        if let Some(ref path) = summary.path {
            writeln!(f, "Path: {path}")?;
        }
        if let Some(port) = summary.data_port {
            writeln!(f, "Data port: {port}")?;
        }
        writeln!(f, "Slots: {} total, {} free", opt_count(summary.slots_number), opt_count(summary.free_slots))?;

        if let Some(ref hardware) = summary.hardware {
            write_hardware(f, hardware)?;
        }
        if let Some(ref total) = summary.total_resource {
            write_resource_profile(f, "Total resources", total)?;
        }
        if let Some(ref free) = summary.free_resource {
            write_resource_profile(f, "Free resources", free)?;
        }
        if let Some(ref memory) = summary.memory_configuration {
            write_memory_configuration(f, memory)?;
        }
        if let Some(ref metrics) = report.detail.metrics {
            write_detail_metrics(f, metrics)?;
        }

        if !report.detail.allocated_slots.is_empty() {
            writeln!(f, "Allocated slots:")?;
            for slot in report.detail.allocated_slots.iter() {
                let job = slot.job_id.as_ref().map_or_else(|| NOT_AVAILABLE.to_string(), |j| j.to_string());
                writeln!(f, "{INDENT}slot {}: job {job}", opt_count(slot.index))?;
            }
        }

        writeln!(f, "Heap utilization: {}", format_opt_percent(report.assessment.summary.heap_utilization))?;
        writeln!(f, "Assessment:")?;
        write_assessment(f, &report.assessment, INDENT)
    }
}

impl fmt::Display for Text<'_, TaskManagerMetrics> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TaskManagerMetrics::Available { taskmanager, total, groups } => {
                writeln!(f, "{total} metrics available on taskmanager {taskmanager}")?;
                for (group, ids) in groups.iter() {
                    writeln!(f, "{group}:")?;
                    for id in ids.iter() {
                        writeln!(f, "{INDENT}{id}")?;
                    }
                }
                Ok(())
            },
            TaskManagerMetrics::Values { taskmanager, metrics, missing } => {
                writeln!(f, "Metrics of taskmanager {taskmanager}:")?;
                for metric in metrics.iter() {
                    writeln!(f, "{INDENT}{}: {}", metric.id, format_metric(metric))?;
                }
                if !missing.is_empty() {
                    writeln!(f, "not exposed: {}", missing.join(", "))?;
                }
                Ok(())
            },
        }
    }
}

fn write_subtasks(f: &mut fmt::Formatter<'_>, metrics: &MetricIndex) -> fmt::Result {
    for subtask in metrics.subtasks() {
        let level = subtask.effective_level().map_or_else(|| NOT_AVAILABLE.to_string(), |l| l.to_string());
        writeln!(
            f,
            "{INDENT}subtask {}: {level}, backpressured {}, idle {}, busy {}",
            subtask.subtask,
            format_opt_percent(subtask.ratio),
            format_opt_percent(subtask.idle_ratio),
            format_opt_percent(subtask.busy_ratio),
        )?;
    }
    Ok(())
}

impl fmt::Display for Text<'_, BackpressureDiagnosis> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagnosis = self.0;
        writeln!(f, "Backpressure of vertex {} in job {}", diagnosis.vertex, diagnosis.job)?;
        writeln!(f, "Status: {}", opt_text(diagnosis.report.status.as_deref()))?;
        writeln!(f, "Level: {}", opt_text(diagnosis.report.backpressure_level.as_deref()))?;
        if diagnosis.report.end_timestamp.is_some() {
            writeln!(f, "Sampled at: {}", opt_timestamp(diagnosis.report.end_timestamp))?;
        }

        writeln!(f, "Subtasks:")?;
        write_subtasks(f, &diagnosis.metrics)?;
        writeln!(
            f,
            "Max backpressure ratio: {}",
            format_opt_percent(diagnosis.assessment.summary.max_backpressure_ratio)
        )?;
        writeln!(f, "Assessment:")?;
        write_assessment(f, &diagnosis.assessment, INDENT)
    }
}

impl fmt::Display for Text<'_, [JarFile]> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No JARs uploaded.");
        }

        for jar in self.0.iter() {
            writeln!(f, "{} - {}", jar.id, jar.name)?;
        }
        Ok(())
    }
}
