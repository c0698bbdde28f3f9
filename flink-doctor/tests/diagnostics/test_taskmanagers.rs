use approx::assert_relative_eq;
use claims::*;
use flink_doctor::engine::{CapacityOutlook, TaskManagerMetrics};
use flink_doctor::flink::{FlinkError, TaskManagerId};
use flink_doctor::phases::diagnose::Severity;
use flink_doctor::phases::normalize::format_metric;
use flink_doctor::report::Text;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{self, MetricValuesResponder, TM_ID};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_taskmanagers_with_capacity() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_list_taskmanagers_with_capacity");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/taskmanagers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::taskmanagers_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = assert_ok!(engine.list_taskmanagers().await);
    assert_eq!(report.taskmanagers.len(), 2);

    let capacity = &report.capacity;
    assert_eq!(capacity.total_slots, 8);
    assert_eq!(capacity.free_slots, 4);
    assert_eq!(capacity.used_slots, 4);
    assert_relative_eq!(assert_some!(capacity.used_ratio), 0.5);
    assert_eq!(capacity.outlook, CapacityOutlook::Sufficient);

    let saturated = &report.taskmanagers[0].assessment;
    assert_eq!(
        saturated.findings.iter().map(|f| (f.rule.as_str(), f.severity)).collect::<Vec<_>>(),
        vec![
            ("slot_saturation", Severity::Warn),
            ("memory_saturation", Severity::Warn),
            ("cpu_slot_mismatch", Severity::Warn),
        ]
    );
    assert!(saturated.advisories.is_empty());

    let idle = &report.taskmanagers[1].assessment;
    assert!(idle.is_healthy());
    assert_some!(idle.advisory_for("cpu_slot_mismatch"));

    let text = Text(&report).to_string();
    assert!(text.contains("Used slots: 4 (50.0%)"), "report:\n{text}");
    assert!(text.contains("slot utilization: 100.0% [HIGH]"), "report:\n{text}");
    assert!(text.contains("memory utilization: 95.0% [HIGH]"), "report:\n{text}");
    assert!(text.contains("Recommendation: sufficient slot capacity available"), "report:\n{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_taskmanager_details_assess_heap() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_taskmanager_details_assess_heap");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/taskmanagers/{TM_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::taskmanager_detail_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = assert_ok!(engine.taskmanager_details(&TaskManagerId::new(TM_ID)).await);
    assert_eq!(report.detail.summary.id, TaskManagerId::new(TM_ID));
    assert_eq!(report.detail.summary.data_port, Some(41351));
    assert_eq!(report.detail.allocated_slots.len(), 1);

    let assessment = &report.assessment;
    assert_eq!(assessment.overall_severity(), Severity::Critical);
    assert_eq!(assessment.findings.len(), 1);
    assert_some!(assessment.finding_for("heap_saturation"));
    assert_relative_eq!(assert_some!(assessment.summary.heap_utilization), 0.95);
    assert_relative_eq!(assert_some!(assessment.summary.slot_utilization), 0.5);

    let text = Text(&report).to_string();
    assert!(text.contains("task heap: 384.00 MB"), "report:\n{text}");
    assert!(text.contains(&format!("slot 0: job {}", fixtures::JOB_ID)), "report:\n{text}");
    assert!(text.contains("gc G1_Young_Generation: 12 collections, 0.34s"), "report:\n{text}");
    assert!(text.contains("[CRITICAL] heap_saturation: heap near capacity: 95.0% used"), "report:\n{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_taskmanager_metrics_listing_and_values() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let main_span = tracing::info_span!("test_taskmanager_metrics_listing_and_values");
    let _ = main_span.enter();

    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path(format!("/taskmanagers/{TM_ID}/metrics")))
        .respond_with(MetricValuesResponder(maplit::hashmap! {
            "Status.JVM.Memory.Heap.Used".to_string() => json!("536870912"),
            "Status.JVM.Memory.Heap.Max".to_string() => json!(1073741824_i64),
            "Status.JVM.CPU.Load".to_string() => json!(0.25),
            "Status.Network.TotalMemorySegments".to_string() => json!(4096),
        }))
        .mount(&mock_server)
        .await;

    let taskmanager = TaskManagerId::new(TM_ID);
    let listing = assert_ok!(engine.taskmanager_metrics(&taskmanager, &[]).await);
    let TaskManagerMetrics::Available { total, groups, .. } = listing else {
        panic!("expected available metric listing");
    };
    assert_eq!(total, 4);
    assert_eq!(
        groups.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Status.JVM.CPU", "Status.JVM.Memory", "Status.Network.TotalMemorySegments"]
    );
    assert_eq!(groups["Status.JVM.Memory"].len(), 2);

    let names = vec![
        "Status.JVM.CPU.Load".to_string(),
        "Status.JVM.Memory.Heap.Used".to_string(),
        "Status.Not.Exposed".to_string(),
    ];
    let values = assert_ok!(engine.taskmanager_metrics(&taskmanager, &names).await);
    let TaskManagerMetrics::Values { metrics, missing, .. } = values else {
        panic!("expected metric values");
    };
    assert_eq!(
        metrics.iter().map(|m| (m.id.as_str(), format_metric(m))).collect::<Vec<_>>(),
        vec![
            ("Status.JVM.CPU.Load", "25.0%".to_string()),
            ("Status.JVM.Memory.Heap.Used", "512.00 MB".to_string()),
        ]
    );
    assert_eq!(missing, vec!["Status.Not.Exposed".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_taskmanager_not_found() {
    once_cell::sync::Lazy::force(&flink_doctor::logging::TEST_TRACING);
    let mock_server = MockServer::start().await;
    let engine = fixtures::connected_engine(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/taskmanagers/unknown-tm"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let error = assert_err!(engine.taskmanager_details(&TaskManagerId::new("unknown-tm")).await);
    let fetch_error = assert_some!(error.fetch_error());
    assert!(fetch_error.is_client_error());
    assert_matches!(error, FlinkError::Fetch(_));
}
