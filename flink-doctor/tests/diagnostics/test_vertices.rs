use approx::assert_relative_eq;
use claims::*;
use flink_doctor::flink::{BackpressureLevel, FlinkError, JobId, VertexId};
use flink_doctor::phases::diagnose::Severity;
use flink_doctor::report::Text;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{self, JOB_ID, VERTEX_ID};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_vertex_backpressure_and_skew() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_vertex_backpressure_and_skew");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}/vertices/{VERTEX_ID}/backpressure")))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::backpressure_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let diagnosis = assert_ok!(engine.vertex_backpressure(&JobId::new(JOB_ID), &VertexId::new(VERTEX_ID)).await);
    let subtasks = diagnosis.metrics.subtasks();
    assert_eq!(subtasks.len(), 2);
    assert_eq!(subtasks[1].level, Some(BackpressureLevel::High));
    assert_relative_eq!(assert_some!(subtasks[1].ratio), 0.8);

    let assessment = &diagnosis.assessment;
    assert_eq!(
        assessment.findings.iter().map(|f| (f.rule.as_str(), f.severity)).collect::<Vec<_>>(),
        vec![("backpressure", Severity::Critical), ("data_skew", Severity::Warn)]
    );
    assert_relative_eq!(assert_some!(assessment.summary.max_backpressure_ratio), 0.8);
    assert_relative_eq!(assert_some!(assessment.summary.backpressure_spread), 0.7, epsilon = 1e-9);

    let text = Text(&diagnosis).to_string();
    assert!(text.contains("subtask 0: ok, backpressured 10.0%, idle 90.0%, busy 0.0%"), "report:\n{text}");
    assert!(text.contains("[CRITICAL] backpressure: high backpressure on vertex"), "report:\n{text}");
    assert!(text.contains("[WARN] data_skew: data skew detected"), "report:\n{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_vertex_backpressure_without_samples() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}/vertices/{VERTEX_ID}/backpressure")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "deprecated" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let diagnosis = assert_ok!(engine.vertex_backpressure(&JobId::new(JOB_ID), &VertexId::new(VERTEX_ID)).await);
    assert!(diagnosis.metrics.subtasks().is_empty());
    assert!(diagnosis.assessment.is_healthy());
    assert_none!(diagnosis.assessment.summary.backpressure_spread);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_vertex_backpressure_rejects_blank_vertex() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;

    assert_matches!(
        engine.vertex_backpressure(&JobId::new(JOB_ID), &VertexId::new("")).await,
        Err(FlinkError::EmptyResourceId("vertex"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_jars() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/jars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "address": "http://localhost:8081",
            "files": [{
                "id": "d1f3e8c0-0b1a_wordcount.jar",
                "name": "wordcount.jar",
                "uploaded": 1639156793312_i64,
                "entry": [{ "name": "org.apache.flink.WordCount", "description": null }]
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let jars = assert_ok!(engine.list_jars().await);
    assert_eq!(Text(jars.as_slice()).to_string(), "d1f3e8c0-0b1a_wordcount.jar - wordcount.jar\n");
}
