//! Request-level facade over the Flink REST API. Each operation checks the session, fetches what
//! it needs, normalizes it and, where rules apply, evaluates them into an [`Assessment`].
//!
//! [`Assessment`]: crate::phases::diagnose::Assessment

mod views;

use std::sync::Arc;

use futures_util::future;
use serde::de::DeserializeOwned;

pub use views::{
    BackpressureDiagnosis, CapacityOutlook, ClusterCapacity, ConnectionStatus, Insight, JobDiagnosis, JobReport,
    TaskManagerHealth, TaskManagerMetrics, TaskManagerReport, TaskManagersReport, UtilizationBand, VertexReport,
};

use crate::flink::{
    self, Ack, BackpressureReport, ClusterOverview, ConnectionSession, FlinkContext, FlinkError, JarFile,
    JarsOverview, JobConfig, JobDetail, JobExceptions, JobId, JobOverview, JobsOverview, MetricCatalog, ResourceRef,
    TaskManagerDetail, TaskManagerId, TaskManagersOverview, TaskState, VertexDetail, VertexId,
};
use crate::phases::diagnose::DiagnosticEvaluator;
use crate::phases::normalize::{self, MetricIndex};
use crate::phases::sense::SnapshotFetcher;
use crate::settings::FlinkSettings;

#[derive(Debug)]
pub struct DiagnosticEngine {
    session: Arc<ConnectionSession>,
    fetcher: SnapshotFetcher,
    evaluator: DiagnosticEvaluator,
}

impl DiagnosticEngine {
    pub fn new(session: Arc<ConnectionSession>, metrics_batch_size: usize) -> Self {
        let fetcher = SnapshotFetcher::new(Arc::clone(&session), metrics_batch_size);
        Self { session, fetcher, evaluator: DiagnosticEvaluator::default() }
    }

    pub fn from_settings(settings: &FlinkSettings) -> Result<Self, FlinkError> {
        let context = FlinkContext::from_settings(settings)?;
        let session = Arc::new(ConnectionSession::new(context));
        Ok(Self::new(session, settings.metrics_batch_size))
    }

    pub fn with_evaluator(self, evaluator: DiagnosticEvaluator) -> Self {
        Self { evaluator, ..self }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub async fn initialize(&self, endpoint: &str) -> Result<Ack, FlinkError> {
        self.session.initialize(endpoint).await
    }

    /// Session state, plus the cluster overview when the session is initialized. A failed
    /// overview is reported alongside the state rather than raised.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn connection_status(&self) -> ConnectionStatus {
        let state = self.session.status().await;
        if !state.initialized {
            return ConnectionStatus { state, overview: None, overview_error: None };
        }

        match self.cluster_overview().await {
            Ok(overview) => ConnectionStatus { state, overview: Some(overview), overview_error: None },
            Err(err) => ConnectionStatus { state, overview: None, overview_error: Some(err.to_string()) },
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn cluster_overview(&self) -> Result<ClusterOverview, FlinkError> {
        self.query(flink::OVERVIEW, &["overview"]).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_jobs(&self) -> Result<Vec<JobOverview>, FlinkError> {
        let overview: JobsOverview = self.query(flink::JOBS_OVERVIEW, &["jobs", "overview"]).await?;
        Ok(overview.jobs)
    }

    /// Job detail with vertex io metrics and insights. The execution config is secondary: if it
    /// cannot be fetched the report carries `config_error` instead.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn job_details(&self, job_id: &JobId) -> Result<JobReport, FlinkError> {
        self.session.require_initialized().await?;
        ResourceRef::job(job_id.clone()).validate()?;

        let detail_path = ["jobs", job_id.as_ref()];
        let config_path = ["jobs", job_id.as_ref(), "config"];
        let (detail, config) = future::join(
            self.query::<JobDetail>(flink::JOB_DETAIL, &detail_path),
            self.query::<JobConfig>(flink::JOB_CONFIG, &config_path),
        )
        .await;

        let detail = detail?;
        let (config, config_error) = match config {
            Ok(config) => (config.execution_config, None),
            Err(err) => {
                tracing::warn!(error=?err, %job_id, "failed to fetch job config - continuing without it");
                (None, Some(err.to_string()))
            },
        };

        let vertices: Vec<VertexReport> = detail.vertices.iter().map(vertex_report).collect();
        let insights = vertices.iter().flat_map(|v| v.insights()).collect();

        Ok(JobReport {
            total_parallelism: vertices.iter().map(|v| v.parallelism).sum(),
            failed_tasks: vertices.iter().map(|v| v.failed_tasks).sum(),
            jid: detail.jid,
            name: detail.name,
            state: detail.state,
            start_time: detail.start_time,
            end_time: detail.end_time,
            duration: detail.duration,
            vertices,
            insights,
            config,
            config_error,
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn job_exceptions(&self, job_id: &JobId) -> Result<JobExceptions, FlinkError> {
        self.session.require_initialized().await?;
        ResourceRef::job(job_id.clone()).validate()?;
        self.query(flink::JOB_EXCEPTIONS, &["jobs", job_id.as_ref(), "exceptions"]).await
    }

    /// Fetch the job's health metrics and evaluate every rule against them.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn diagnose_job(&self, job_id: &JobId) -> Result<JobDiagnosis, FlinkError> {
        let resource = ResourceRef::job(job_id.clone());
        let catalog = MetricCatalog::job();
        let names = catalog.names();

        let snapshot = self.fetcher.fetch_metrics(&resource, &names).await?;
        let index = normalize::index_by_id(&snapshot.points, &catalog);
        let assessment = self.evaluator.evaluate(&index, &resource);

        Ok(JobDiagnosis {
            job: job_id.clone(),
            fetched_at: snapshot.fetched_at,
            metrics: index.ordered(names.iter().copied()).into_iter().cloned().collect(),
            assessment,
        })
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn list_taskmanagers(&self) -> Result<TaskManagersReport, FlinkError> {
        let overview: TaskManagersOverview = self.query(flink::TASKMANAGERS, &["taskmanagers"]).await?;
        let capacity = ClusterCapacity::from_taskmanagers(&overview.taskmanagers);

        let taskmanagers = overview
            .taskmanagers
            .into_iter()
            .map(|summary| {
                let metrics = normalize::normalize_taskmanager(&summary, None);
                let assessment = self.evaluator.evaluate(&metrics, &ResourceRef::taskmanager(summary.id.clone()));
                TaskManagerHealth { summary, metrics, assessment }
            })
            .collect();

        Ok(TaskManagersReport { taskmanagers, capacity })
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn taskmanager_details(&self, taskmanager_id: &TaskManagerId) -> Result<TaskManagerReport, FlinkError> {
        let resource = ResourceRef::taskmanager(taskmanager_id.clone());
        self.session.require_initialized().await?;
        resource.validate()?;

        let detail: TaskManagerDetail = self
            .query(flink::TASKMANAGER_DETAIL, &["taskmanagers", taskmanager_id.as_ref()])
            .await?;
        let metrics = normalize::normalize_taskmanager(&detail.summary, detail.metrics.as_ref());
        let assessment = self.evaluator.evaluate(&metrics, &resource);
        Ok(TaskManagerReport { detail, metrics, assessment })
    }

    /// With no `names`, list the metric ids the taskmanager exposes; otherwise fetch the named
    /// metrics, typed by name.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn taskmanager_metrics(
        &self, taskmanager_id: &TaskManagerId, names: &[String],
    ) -> Result<TaskManagerMetrics, FlinkError> {
        let resource = ResourceRef::taskmanager(taskmanager_id.clone());

        if names.is_empty() {
            let available = self.fetcher.available_metrics(&resource).await?;
            return Ok(TaskManagerMetrics::Available {
                taskmanager: taskmanager_id.clone(),
                total: available.len(),
                groups: views::group_metric_ids(available),
            });
        }

        let catalog = MetricCatalog::taskmanager();
        let snapshot = self.fetcher.fetch_metrics(&resource, names).await?;
        let index = normalize::index_by_name(&snapshot.points, &catalog);
        let missing = names.iter().filter(|n| index.get(n.as_str()).is_none()).cloned().collect();

        Ok(TaskManagerMetrics::Values {
            taskmanager: taskmanager_id.clone(),
            metrics: index.ordered(names.iter().map(String::as_str)).into_iter().cloned().collect(),
            missing,
        })
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn vertex_backpressure(
        &self, job_id: &JobId, vertex_id: &VertexId,
    ) -> Result<BackpressureDiagnosis, FlinkError> {
        let resource = ResourceRef::vertex(job_id.clone(), vertex_id.clone());
        self.session.require_initialized().await?;
        resource.validate()?;

        let report: BackpressureReport = self
            .query(
                flink::VERTEX_BACKPRESSURE,
                &["jobs", job_id.as_ref(), "vertices", vertex_id.as_ref(), "backpressure"],
            )
            .await?;
        let metrics = normalize::normalize_backpressure(&report);
        let assessment = self.evaluator.evaluate(&metrics, &resource);

        Ok(BackpressureDiagnosis {
            job: job_id.clone(),
            vertex: vertex_id.clone(),
            report,
            metrics,
            assessment,
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_jars(&self) -> Result<Vec<JarFile>, FlinkError> {
        let jars: JarsOverview = self.query(flink::JARS, &["jars"]).await?;
        Ok(jars.files)
    }

    async fn query<T>(&self, action: &str, segments: &[&str]) -> Result<T, FlinkError>
    where
        T: DeserializeOwned,
    {
        let url = self.session.url_for(segments).await?;
        let result = self.session.context().query_json(action, url).await?;
        Ok(result)
    }
}

fn vertex_report(vertex: &VertexDetail) -> VertexReport {
    let metrics: MetricIndex = normalize::normalize_vertex(vertex);
    VertexReport {
        id: vertex.id.clone(),
        name: vertex.name.clone(),
        parallelism: vertex.parallelism,
        status: vertex.status,
        duration: vertex.duration,
        failed_tasks: vertex.tasks.get(&TaskState::Failed).copied().unwrap_or(0),
        throughput: views::throughput(metrics.value("write-records"), vertex.duration),
        metrics,
    }
}
