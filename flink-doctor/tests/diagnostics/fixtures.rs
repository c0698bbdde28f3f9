use std::collections::HashMap;
use std::time::Duration;

use claims::*;
use flink_doctor::engine::DiagnosticEngine;
use flink_doctor::settings::FlinkSettings;
use serde_json::{json, Value};
use trim_margin::MarginTrimmable;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const JOB_ID: &str = "a97b6344d775aafe03e55a8e812d2713";
pub const VERTEX_ID: &str = "cbc357ccb763df2852fee8c4fc7d55f2";
pub const TM_ID: &str = "10.1.2.3:6122-ab12cd";

pub fn engine() -> DiagnosticEngine {
    let settings = FlinkSettings {
        request_timeout: Duration::from_secs(5),
        ..FlinkSettings::default()
    };
    assert_ok!(DiagnosticEngine::from_settings(&settings))
}

pub async fn mount_overview(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(overview_body()))
        .mount(mock_server)
        .await;
}

pub async fn connected_engine(mock_server: &MockServer) -> DiagnosticEngine {
    mount_overview(mock_server).await;
    let engine = engine();
    assert_ok!(engine.initialize(mock_server.uri().as_str()).await);
    engine
}

pub fn overview_body() -> Value {
    json!({
        "taskmanagers": 2,
        "slots-total": 8,
        "slots-available": 4,
        "jobs-running": 1,
        "jobs-finished": 3,
        "jobs-cancelled": 0,
        "jobs-failed": 1,
        "flink-version": "1.16.0",
        "flink-commit": "abc1234"
    })
}

fn parse_fixture(fixture: &str) -> Value {
    let body = assert_some!(fixture.trim_margin_with("|"));
    assert_ok!(serde_json::from_str(body.as_str()))
}

pub fn job_detail_body() -> Value {
    parse_fixture(
        r##"
        |{
        |  "jid": "a97b6344d775aafe03e55a8e812d2713",
        |  "name": "CarTopSpeedWindowingExample",
        |  "isStoppable": false,
        |  "state": "RUNNING",
        |  "start-time": 1639156793312,
        |  "end-time": -1,
        |  "duration": 23079,
        |  "vertices": [
        |    {
        |      "id": "cbc357ccb763df2852fee8c4fc7d55f2",
        |      "name": "Source: Custom Source",
        |      "parallelism": 2,
        |      "status": "RUNNING",
        |      "start-time": 1639156793412,
        |      "end-time": -1,
        |      "duration": 2000,
        |      "tasks": { "RUNNING": 1, "FAILED": 1 },
        |      "metrics": {
        |        "read-records": 0,
        |        "read-records-complete": true,
        |        "write-records": 1200,
        |        "write-records-complete": true,
        |        "write-bytes": 1572864,
        |        "accumulated-backpressured-time": 1500,
        |        "accumulated-idle-time": 0,
        |        "accumulated-busy-time": 500
        |      }
        |    },
        |    {
        |      "id": "90bea66de1c231edf33913ecd54406c1",
        |      "name": "Sink: Print to Std. Out",
        |      "parallelism": 3,
        |      "status": "RUNNING",
        |      "start-time": 1639156793412,
        |      "end-time": -1,
        |      "duration": 2000,
        |      "tasks": { "RUNNING": 3 },
        |      "metrics": {
        |        "read-records": 1200,
        |        "write-records": 0,
        |        "accumulated-backpressured-time": 0,
        |        "accumulated-idle-time": 1500,
        |        "accumulated-busy-time": "NaN"
        |      }
        |    }
        |  ],
        |  "status-counts": { "RUNNING": 2 }
        |}"##,
    )
}

pub fn job_config_body() -> Value {
    json!({
        "jid": JOB_ID,
        "name": "CarTopSpeedWindowingExample",
        "execution-config": {
            "execution-mode": "PIPELINED",
            "restart-strategy": "Restart deactivated.",
            "job-parallelism": 2,
            "object-reuse-mode": false,
            "user-config": {}
        }
    })
}

pub fn taskmanagers_body() -> Value {
    parse_fixture(
        r##"
        |{
        |  "taskmanagers": [
        |    {
        |      "id": "10.1.2.3:6122-ab12cd",
        |      "path": "akka.tcp://flink@10.1.2.3:6122/user/rpc/taskmanager_0",
        |      "dataPort": 41351,
        |      "timeSinceLastHeartbeat": 1639156816391,
        |      "slotsNumber": 4,
        |      "freeSlots": 0,
        |      "hardware": {
        |        "cpuCores": 2,
        |        "physicalMemory": 1000,
        |        "freeMemory": 50,
        |        "managedMemory": 100
        |      }
        |    },
        |    {
        |      "id": "10.1.2.4:6122-ef34gh",
        |      "slotsNumber": 4,
        |      "freeSlots": 4,
        |      "hardware": {
        |        "cpuCores": 8,
        |        "physicalMemory": 1000,
        |        "freeMemory": 800,
        |        "managedMemory": 100
        |      }
        |    }
        |  ]
        |}"##,
    )
}

pub fn taskmanager_detail_body() -> Value {
    json!({
        "id": TM_ID,
        "path": "akka.tcp://flink@10.1.2.3:6122/user/rpc/taskmanager_0",
        "dataPort": 41351,
        "slotsNumber": 2,
        "freeSlots": 1,
        "totalResource": { "cpuCores": 2.0, "taskHeapMemory": 384, "managedMemory": 512 },
        "hardware": { "cpuCores": 2, "physicalMemory": 1000, "freeMemory": 500, "managedMemory": 100 },
        "memoryConfiguration": { "taskHeap": 402653184_i64, "totalProcessMemory": 1728053248_i64 },
        "metrics": {
            "heapUsed": 950,
            "heapCommitted": 1000,
            "heapMax": 1000,
            "garbageCollectors": [{ "name": "G1_Young_Generation", "count": 12, "time": 340 }]
        },
        "allocatedSlots": [{ "index": 0, "jobId": JOB_ID }]
    })
}

pub fn backpressure_body() -> Value {
    json!({
        "status": "ok",
        "backpressureLevel": "high",
        "end-timestamp": 1639156816391_i64,
        "subtasks": [
            { "subtask": 0, "backpressureLevel": "ok", "ratio": 0.1, "idleRatio": 0.9, "busyRatio": 0.0 },
            { "subtask": 1, "backpressureLevel": "high", "ratio": "0.8", "idleRatio": 0.0, "busyRatio": 0.2 }
        ]
    })
}

/// Serves a Flink `/metrics` endpoint: without `get` it lists the metric ids, with `get` it
/// returns the values of the requested ids it knows.
pub struct MetricValuesResponder(pub HashMap<String, Value>);

impl Respond for MetricValuesResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let requested: Option<Vec<String>> = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "get")
            .map(|(_, v)| v.split(',').map(str::to_string).collect());

        let body: Vec<Value> = match requested {
            None => {
                let mut ids: Vec<&String> = self.0.keys().collect();
                ids.sort();
                ids.into_iter().map(|id| json!({ "id": id })).collect()
            },
            Some(names) => names
                .iter()
                .filter_map(|name| self.0.get(name).map(|value| json!({ "id": name, "value": value })))
                .collect(),
        };

        ResponseTemplate::new(200).set_body_json(body)
    }
}
