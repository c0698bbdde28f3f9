use approx::assert_relative_eq;
use claims::*;
use flink_doctor::engine::Insight;
use flink_doctor::flink::{FlinkError, JobId, JobState};
use flink_doctor::phases::diagnose::{
    CheckpointNotExternalizedRule, DiagnosticEvaluator, DiagnosticRule, RestartInstabilityRule, Severity,
};
use flink_doctor::report::Text;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{self, MetricValuesResponder, JOB_ID};

async fn mount_job_detail(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::job_detail_body()))
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_jobs() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_list_jobs");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/jobs/overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [
                { "jid": JOB_ID, "name": "CarTopSpeedWindowingExample", "state": "RUNNING", "start-time": 1639156793312_i64 },
                { "jid": "0771e8332dc401d254a140a707169a48", "name": "WordCount", "state": "FINISHED" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let jobs = assert_ok!(engine.list_jobs().await);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].jid, JobId::new(JOB_ID));
    assert_eq!(jobs[0].state, JobState::Running);
    assert_eq!(jobs[1].state, JobState::Finished);
    assert!(!jobs[1].state.is_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_details_survive_config_failure() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_job_details_survive_config_failure");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    mount_job_detail(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}/config")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = assert_ok!(engine.job_details(&JobId::new(JOB_ID)).await);
    assert_eq!(report.name, "CarTopSpeedWindowingExample");
    assert_eq!(report.state, JobState::Running);
    assert_none!(report.end_time);
    assert_none!(report.config.as_ref());
    let config_error = assert_some!(report.config_error.as_deref());
    assert!(config_error.contains("500"), "config error: {config_error}");

    assert_eq!(report.total_parallelism, 5);
    assert_eq!(report.failed_tasks, 1);
    assert_eq!(report.vertices.len(), 2);

    let source = &report.vertices[0];
    assert_relative_eq!(assert_some!(source.throughput), 600.0);
    assert_none!(source.metrics.get("write-records-complete"));
    assert_none!(report.vertices[1].throughput);
    assert_none!(report.vertices[1].metrics.value("accumulated-busy-time"));

    assert_eq!(
        report.insights,
        vec![
            Insight::Backpressure {
                vertex: "Source: Custom Source".to_string(),
                backpressured_millis: 1_500.0,
            },
            Insight::FailedTasks { vertex: "Source: Custom Source".to_string(), count: 1 },
            Insight::HighIdle { vertex: "Sink: Print to Std. Out".to_string(), idle_ratio: 0.75 },
        ]
    );

    let as_json = assert_ok!(serde_json::to_value(&report));
    assert!(as_json.get("config_error").is_some());

    let text = Text(&report).to_string();
    assert!(text.contains("Execution config unavailable"), "report:\n{text}");
    assert!(text.contains("throughput: 600.00 records/s"), "report:\n{text}");
    assert!(text.contains("backpressure detected in 'Source: Custom Source': 1.50s"), "report:\n{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_details_with_config() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_job_details_with_config");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    mount_job_detail(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}/config")))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::job_config_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = assert_ok!(engine.job_details(&JobId::new(JOB_ID)).await);
    assert_none!(report.config_error);
    let config = assert_some!(report.config);
    assert_eq!(config.execution_mode.as_deref(), Some("PIPELINED"));
    assert_eq!(config.job_parallelism, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_details_rejects_blank_job_id() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;

    assert_matches!(
        engine.job_details(&JobId::new(" ")).await,
        Err(FlinkError::EmptyResourceId("job"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_exceptions() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_job_exceptions");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}/exceptions")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "root-exception": "java.lang.RuntimeException: boom\n\tat Example.map(Example.java:42)",
            "timestamp": 1639156816391_i64,
            "all-exceptions": [{
                "exception": "java.lang.RuntimeException: boom",
                "task": "Map (1/2)",
                "location": "10.1.2.3:41351",
                "timestamp": 1639156816391_i64
            }],
            "truncated": false,
            "exceptionHistory": {
                "entries": [{
                    "exceptionName": "java.lang.RuntimeException",
                    "stacktrace": "java.lang.RuntimeException: boom",
                    "timestamp": 1639156816391_i64,
                    "taskName": "Map (1/2)",
                    "concurrentExceptions": [{ "exceptionName": "java.io.IOException", "taskName": "Map (2/2)" }]
                }],
                "truncated": true
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let exceptions = assert_ok!(engine.job_exceptions(&JobId::new(JOB_ID)).await);
    assert_eq!(exceptions.all_exceptions.len(), 1);
    let history = assert_some!(exceptions.exception_history.as_ref());
    assert_eq!(history.entries[0].concurrent_exceptions.len(), 1);

    let text = Text(&exceptions).to_string();
    assert!(text.starts_with("Root cause"), "report:\n{text}");
    assert!(text.contains("concurrent: java.io.IOException"), "report:\n{text}");
    assert!(text.contains("Summary: 1 exceptions, 1 history entries (truncated)"), "report:\n{text}");
}

async fn mount_job_metrics(mock_server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{JOB_ID}/metrics")))
        .respond_with(MetricValuesResponder(maplit::hashmap! {
            "uptime".to_string() => json!("1000000"),
            "numRestarts".to_string() => json!(0),
            "totalNumberOfCheckpoints".to_string() => json!("10"),
            "numberOfCompletedCheckpoints".to_string() => json!(6),
            "numberOfFailedCheckpoints".to_string() => json!(4),
            "lastCheckpointDuration".to_string() => json!(1200),
            "someOtherMetric".to_string() => json!(17),
        }))
        .expect(expected_calls)
        .mount(mock_server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diagnose_job() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_diagnose_job");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    mount_job_metrics(&mock_server, 2).await;

    let diagnosis = assert_ok!(engine.diagnose_job(&JobId::new(JOB_ID)).await);
    assert_eq!(
        diagnosis.metrics.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        vec![
            "uptime",
            "numRestarts",
            "totalNumberOfCheckpoints",
            "numberOfCompletedCheckpoints",
            "numberOfFailedCheckpoints",
            "lastCheckpointDuration",
        ]
    );

    let assessment = &diagnosis.assessment;
    assert_eq!(assessment.overall_severity(), Severity::Critical);
    assert_eq!(assessment.findings.len(), 1);
    let finding = assert_some!(assessment.finding_for("checkpoint_failure_ratio"));
    assert_eq!(finding.severity, Severity::Critical);
    assert!(finding.message.starts_with("checkpoint failure ratio exceeds 30%"));
    assert_some!(assessment.advisory_for("checkpoint_not_externalized"));
    assert_relative_eq!(assert_some!(assessment.summary.checkpoint_failure_ratio), 0.4);
    assert_relative_eq!(assert_some!(assessment.summary.checkpoint_success_ratio), 0.6);

    let text = Text(&diagnosis).to_string();
    assert!(text.contains("Overall: CRITICAL"), "report:\n{text}");
    assert!(text.contains("[CRITICAL] checkpoint_failure_ratio: "), "report:\n{text}");
    assert!(text.contains("tip: completed checkpoints have no externalized path"), "report:\n{text}");
    assert!(text.contains("uptime: 16.67m (1000s)"), "report:\n{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diagnose_job_with_custom_rules() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_diagnose_job_with_custom_rules");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let rules: Vec<Box<dyn DiagnosticRule>> = vec![Box::new(RestartInstabilityRule), Box::new(CheckpointNotExternalizedRule)];
    let evaluator = DiagnosticEvaluator::new(rules);
    let engine = fixtures::connected_engine(&mock_server).await.with_evaluator(evaluator);
    mount_job_metrics(&mock_server, 2).await;

    let diagnosis = assert_ok!(engine.diagnose_job(&JobId::new(JOB_ID)).await);
    let assessment = &diagnosis.assessment;
    assert!(assessment.is_healthy());
    assert_none!(assessment.finding_for("checkpoint_failure_ratio"));
    assert_eq!(
        assessment.advisories.iter().map(|a| a.rule.as_str()).collect::<Vec<_>>(),
        vec!["checkpoint_not_externalized"]
    );
    assert_relative_eq!(assert_some!(assessment.summary.checkpoint_failure_ratio), 0.4);
}
