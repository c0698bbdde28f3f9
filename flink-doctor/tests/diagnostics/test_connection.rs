use claims::*;
use flink_doctor::flink::{FetchError, FlinkError, JobId, TaskManagerId, VertexId};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{self, JOB_ID};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_operations_require_initialized_session() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_operations_require_initialized_session");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let engine = fixtures::engine();
    assert_matches!(engine.list_jobs().await, Err(FlinkError::NotInitialized));
    assert_matches!(engine.cluster_overview().await, Err(FlinkError::NotInitialized));
    assert_matches!(engine.diagnose_job(&JobId::new(JOB_ID)).await, Err(FlinkError::NotInitialized));
    assert_matches!(engine.list_taskmanagers().await, Err(FlinkError::NotInitialized));

    // an uninitialized session is reported ahead of a blank id
    assert_matches!(engine.diagnose_job(&JobId::new("  ")).await, Err(FlinkError::NotInitialized));
    assert_matches!(engine.job_details(&JobId::new("")).await, Err(FlinkError::NotInitialized));
    assert_matches!(engine.job_exceptions(&JobId::new("")).await, Err(FlinkError::NotInitialized));
    assert_matches!(
        engine.taskmanager_details(&TaskManagerId::new(" ")).await,
        Err(FlinkError::NotInitialized)
    );
    assert_matches!(
        engine.taskmanager_metrics(&TaskManagerId::new(""), &[]).await,
        Err(FlinkError::NotInitialized)
    );
    assert_matches!(
        engine.vertex_backpressure(&JobId::new(""), &VertexId::new("")).await,
        Err(FlinkError::NotInitialized)
    );

    let status = engine.connection_status().await;
    assert!(!status.state.initialized);
    assert_none!(status.overview);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connection_status_includes_overview() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_connection_status_includes_overview");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;

    let status = engine.connection_status().await;
    assert!(status.state.initialized);
    let endpoint = assert_some!(status.state.endpoint);
    assert_eq!(endpoint.as_str().trim_end_matches('/'), mock_server.uri());

    let overview = assert_some!(status.overview);
    assert_eq!(overview.taskmanagers, 2);
    assert_eq!(overview.slots_total, 8);
    assert_eq!(overview.slots_available, 4);
    assert_eq!(overview.jobs_running, 1);
    assert_eq!(overview.jobs_failed, 1);
    assert_eq!(overview.flink_version.as_deref(), Some("1.16.0"));
    assert_none!(status.overview_error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_reinitialize_keeps_prior_endpoint() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_failed_reinitialize_keeps_prior_endpoint");
    let _ = main_span.enter();

    let healthy = MockServer::start().await;
    let engine = fixtures::connected_engine(&healthy).await;

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/overview"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&broken)
        .await;

    let error = assert_err!(engine.initialize(broken.uri().as_str()).await);
    assert_matches!(
        error,
        FlinkError::Connection { source: FetchError::ServerError { status, .. }, .. }
            if status == StatusCode::SERVICE_UNAVAILABLE
    );

    let endpoint = assert_ok!(engine.session().require_initialized().await);
    assert_eq!(endpoint.as_str().trim_end_matches('/'), healthy.uri());
    assert_ok!(engine.cluster_overview().await);
}
