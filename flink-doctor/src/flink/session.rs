use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::flink::{self, FetchError, FlinkContext, FlinkError};

/// Snapshot of the session's target. `initialized` holds iff `endpoint` is present and its last
/// liveness probe succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub endpoint: Option<Url>,
    pub initialized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub endpoint: Url,
}

/// The process's single connection session. Every query against the cluster first passes through
/// [`ConnectionSession::require_initialized`].
#[derive(Debug)]
pub struct ConnectionSession {
    context: FlinkContext,
    state: RwLock<ConnectionState>,
    initialize_guard: Mutex<()>,
}

impl ConnectionSession {
    pub fn new(context: FlinkContext) -> Self {
        Self {
            context,
            state: RwLock::new(ConnectionState::default()),
            initialize_guard: Mutex::new(()),
        }
    }

    pub const fn context(&self) -> &FlinkContext {
        &self.context
    }

    /// Probe `{endpoint}/overview` once and, only if it answers, make `endpoint` the session
    /// target. A failed probe leaves the prior state in place.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn initialize(&self, endpoint: &str) -> Result<Ack, FlinkError> {
        let endpoint = parse_endpoint(endpoint)?;
        let probe = join_path(&endpoint, &["overview"])?;

        let _guard = self.initialize_guard.lock().await;
        let probe_result: Result<serde_json::Value, FetchError> =
            self.context.query_json(flink::OVERVIEW, probe).await;

        match probe_result {
            Ok(_) => {
                let mut state = self.state.write().await;
                *state = ConnectionState { endpoint: Some(endpoint.clone()), initialized: true };
                tracing::info!(%endpoint, "Flink connection initialized");
                Ok(Ack { endpoint })
            },
            Err(source) => {
                tracing::warn!(error=?source, %endpoint, "Flink liveness probe failed - connection state unchanged");
                Err(FlinkError::Connection { endpoint, source })
            },
        }
    }

    pub async fn status(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// The verified endpoint, or `NotInitialized` without any network access.
    pub async fn require_initialized(&self) -> Result<Url, FlinkError> {
        let state = self.state.read().await;
        match (&state.endpoint, state.initialized) {
            (Some(endpoint), true) => Ok(endpoint.clone()),
            _ => Err(FlinkError::NotInitialized),
        }
    }

    /// Endpoint-relative url for an API path, gated on an initialized session.
    pub async fn url_for(&self, segments: &[&str]) -> Result<Url, FlinkError> {
        let endpoint = self.require_initialized().await?;
        join_path(&endpoint, segments)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, FlinkError> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(FlinkError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "endpoint is empty".to_string(),
        });
    }

    let url = Url::parse(trimmed).map_err(|err| FlinkError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(FlinkError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "url cannot be a base".to_string(),
        });
    }

    Ok(url)
}

pub(crate) fn join_path(base: &Url, segments: &[&str]) -> Result<Url, FlinkError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| FlinkError::InvalidEndpoint {
            endpoint: base.to_string(),
            reason: "url cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
