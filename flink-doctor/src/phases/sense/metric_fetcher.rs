use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use url::Url;

use crate::flink::{self, ConnectionSession, FetchError, FlinkError, FlinkMetricResponse, RawMetricPoint, ResourceRef};
use crate::settings::FlinkSettings;

/// Raw metric points retrieved for one resource in a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub resource: ResourceRef,
    pub points: Vec<RawMetricPoint>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    fn empty(resource: ResourceRef) -> Self {
        Self { resource, points: Vec::new(), fetched_at: Utc::now() }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Retrieves metric values for a resource from its `/metrics` endpoint, requesting names in
/// batches that respect the server's query size ceiling.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    session: Arc<ConnectionSession>,
    batch_size: usize,
}

enum BatchOutcome {
    Fetched(Vec<RawMetricPoint>),
    Rejected(FetchError),
}

impl SnapshotFetcher {
    pub fn new(session: Arc<ConnectionSession>, batch_size: usize) -> Self {
        Self { session, batch_size: batch_size.max(1) }
    }

    pub fn from_settings(session: Arc<ConnectionSession>, settings: &FlinkSettings) -> Self {
        Self::new(session, settings.metrics_batch_size)
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Metric ids the server exposes for the resource, in server order.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn available_metrics(&self, resource: &ResourceRef) -> Result<Vec<String>, FlinkError> {
        self.session.require_initialized().await?;
        resource.validate()?;
        let url = self.session.url_for(&resource.metrics_path()).await?;
        let available: FlinkMetricResponse = self.session.context().query_json(flink::METRIC_PICKLIST, url).await?;
        Ok(available.into_iter().map(|p| p.id).collect())
    }

    /// Fetch `desired_names` for the resource. Names the server does not expose are dropped, and
    /// the result follows the order of `desired_names`, batch by batch.
    #[tracing::instrument(level = "info", skip(self, desired_names), fields(nr_desired=%desired_names.len()))]
    pub async fn fetch_metrics<S>(&self, resource: &ResourceRef, desired_names: &[S]) -> Result<Snapshot, FlinkError>
    where
        S: AsRef<str>,
    {
        self.session.require_initialized().await?;
        resource.validate()?;
        let metrics_url = self.session.url_for(&resource.metrics_path()).await?;

        let available: FlinkMetricResponse = self
            .session
            .context()
            .query_json(flink::METRIC_PICKLIST, metrics_url.clone())
            .await?;
        let available: HashSet<String> = available.into_iter().map(|p| p.id).collect();

        let selected: Vec<&str> = desired_names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| available.contains(*name))
            .unique()
            .collect();

        if selected.is_empty() {
            tracing::info!(%resource, "none of the desired metrics are exposed by the server");
            return Ok(Snapshot::empty(resource.clone()));
        }

        let points = match self.fetch_batches(&metrics_url, &selected).await? {
            BatchOutcome::Fetched(points) => points,
            BatchOutcome::Rejected(cause) => {
                tracing::warn!(
                    error=?cause, nr_selected=%selected.len(),
                    "Flink rejected batched metrics query - falling back to one metric per request"
                );
                self.fetch_individually(&metrics_url, &selected).await?
            },
        };

        tracing::debug!(%resource, nr_points=%points.len(), "fetched metrics snapshot");
        Ok(Snapshot { resource: resource.clone(), points, fetched_at: Utc::now() })
    }

    async fn fetch_batches(&self, metrics_url: &Url, selected: &[&str]) -> Result<BatchOutcome, FlinkError> {
        let mut points = Vec::with_capacity(selected.len());

        for batch in selected.chunks(self.batch_size) {
            let url = metrics_query_url(metrics_url, batch);
            let response: Result<FlinkMetricResponse, FetchError> =
                self.session.context().query_json_or_rejected(flink::METRIC_VALUES, url).await;

            match response {
                Ok(batch_points) => points.extend(batch_points),
                Err(err) if err.is_client_error() => return Ok(BatchOutcome::Rejected(err)),
                Err(err) => return Err(err.into()),
            }
        }

        Ok(BatchOutcome::Fetched(points))
    }

    async fn fetch_individually(&self, metrics_url: &Url, selected: &[&str]) -> Result<Vec<RawMetricPoint>, FlinkError> {
        let mut points = Vec::with_capacity(selected.len());

        for name in selected {
            let url = metrics_query_url(metrics_url, &[*name]);
            let response: FlinkMetricResponse = self
                .session
                .context()
                .query_json(flink::METRIC_VALUES, url)
                .await
                .map_err(|source| FlinkError::MetricFetch { metric: (*name).to_string(), source })?;
            points.extend(response);
        }

        Ok(points)
    }
}

fn metrics_query_url(metrics_url: &Url, names: &[&str]) -> Url {
    let mut url = metrics_url.clone();
    url.query_pairs_mut().clear().append_pair("get", names.join(",").as_str());
    url
}
