use std::fmt;
use std::future::Future;

use anyhow::Context;
use clap::Parser;
use flink_doctor::engine::DiagnosticEngine;
use flink_doctor::flink::{JobId, TaskManagerId, VertexId};
use flink_doctor::report::Text;
use flink_doctor::settings::{CliOptions, Command, OutputFormat, Settings};
use flink_doctor::{logging, metrics, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;

static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("flink_doctor".to_string()), None).expect("failed to create prometheus registry")
});

fn main() -> Result<()> {
    let subscriber = logging::get_subscriber("flink_doctor", "info", std::io::stderr);
    logging::init_subscriber(subscriber)?;

    let main_span = tracing::trace_span!("main");
    let _main_span_guard = main_span.enter();

    let options = CliOptions::parse();
    let settings = Settings::load(&options)?;
    if options.emit_metrics {
        metrics::register_metrics(&METRICS_REGISTRY)?;
    }

    let engine = DiagnosticEngine::from_settings(&settings.flink)?;

    start_pipeline(async move {
        let ack = engine
            .initialize(settings.flink.endpoint.as_str())
            .await
            .with_context(|| format!("failed to initialize Flink connection at {}", settings.flink.endpoint))?;
        tracing::info!(endpoint=%ack.endpoint, command=?options.command, "running diagnostic command");

        run_command(&engine, &options.command, options.format).await?;

        if options.emit_metrics {
            emit_metrics()?;
        }
        Ok(())
    })
}

async fn run_command(engine: &DiagnosticEngine, command: &Command, format: OutputFormat) -> Result<()> {
    match command {
        Command::Status => {
            let status = engine.connection_status().await;
            emit(format, &status, Text(&status))
        },
        Command::Cluster => {
            let overview = engine.cluster_overview().await?;
            emit(format, &overview, Text(&overview))
        },
        Command::Jobs => {
            let jobs = engine.list_jobs().await?;
            emit(format, &jobs, Text(jobs.as_slice()))
        },
        Command::Job { job_id } => {
            let report = engine.job_details(&JobId::new(job_id)).await?;
            emit(format, &report, Text(&report))
        },
        Command::Exceptions { job_id } => {
            let exceptions = engine.job_exceptions(&JobId::new(job_id)).await?;
            emit(format, &exceptions, Text(&exceptions))
        },
        Command::DiagnoseJob { job_id } => {
            let diagnosis = engine.diagnose_job(&JobId::new(job_id)).await?;
            emit(format, &diagnosis, Text(&diagnosis))
        },
        Command::Taskmanagers => {
            let report = engine.list_taskmanagers().await?;
            emit(format, &report, Text(&report))
        },
        Command::Taskmanager { taskmanager_id } => {
            let report = engine.taskmanager_details(&TaskManagerId::new(taskmanager_id)).await?;
            emit(format, &report, Text(&report))
        },
        Command::TmMetrics { taskmanager_id, metrics } => {
            let report = engine
                .taskmanager_metrics(&TaskManagerId::new(taskmanager_id), metrics.as_slice())
                .await?;
            emit(format, &report, Text(&report))
        },
        Command::Backpressure { job_id, vertex_id } => {
            let diagnosis = engine
                .vertex_backpressure(&JobId::new(job_id), &VertexId::new(vertex_id))
                .await?;
            emit(format, &diagnosis, Text(&diagnosis))
        },
        Command::Jars => {
            let jars = engine.list_jars().await?;
            emit(format, &jars, Text(jars.as_slice()))
        },
    }
}

fn emit<T: Serialize + ?Sized>(format: OutputFormat, view: &T, text: impl fmt::Display) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{text}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(view)?),
    }
    Ok(())
}

fn emit_metrics() -> Result<()> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    eprint!("{}", String::from_utf8(buffer)?);
    Ok(())
}

#[tracing::instrument(level = "trace", skip(future), fields(worker_threads = num_cpus::get()))]
fn start_pipeline<F>(future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let worker_threads = num_cpus::get();
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?
        .block_on(future)
}
