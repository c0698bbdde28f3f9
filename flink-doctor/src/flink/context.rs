use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use serde::de::DeserializeOwned;
use tracing::Instrument;
use url::Url;

use crate::flink::{self, FetchError, FlinkError};
use crate::settings::FlinkSettings;

/// HTTP capability used to reach the Flink JobManager REST API. Each call is a single GET with
/// the client's request timeout; retries happen only if the client carries a retry middleware.
#[derive(Debug, Clone)]
pub struct FlinkContext {
    inner: Arc<FlinkContextRef>,
}

impl FlinkContext {
    pub fn new(label: impl Into<String>, client: ClientWithMiddleware, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(FlinkContextRef { label: label.into(), client, request_timeout }),
        }
    }

    pub fn from_settings(settings: &FlinkSettings) -> Result<Self, FlinkError> {
        let client = make_http_client(settings)?;
        Ok(Self::new(settings.label.as_str(), client, settings.request_timeout))
    }

    pub fn label(&self) -> &str {
        self.inner.label.as_str()
    }

    pub fn client(&self) -> &ClientWithMiddleware {
        &self.inner.client
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// GET `url` and decode its JSON body. Any non-2xx status is a `ServerError`.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn query_json<T>(&self, action: &str, url: Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let _timer = flink::start_flink_query_timer(action);
        let span = tracing::debug_span!("query Flink REST API", label=%self.label(), %action, %url);
        let result = self.inner.do_query_json(action, &url).instrument(span).await;
        flink::track_result(action, result, "failed Flink API query")
    }

    /// Like [`query_json`](Self::query_json), except a 4xx rejection is an expected answer the
    /// caller recovers from: it is logged at warn and not counted in `flink_errors`.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn query_json_or_rejected<T>(&self, action: &str, url: Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let _timer = flink::start_flink_query_timer(action);
        let span = tracing::debug_span!("query Flink REST API", label=%self.label(), %action, %url);
        match self.inner.do_query_json(action, &url).instrument(span).await {
            Err(err) if err.is_client_error() => {
                tracing::warn!(error=?err, %action, "Flink rejected query");
                Err(err)
            },
            result => flink::track_result(action, result, "failed Flink API query"),
        }
    }
}

fn make_http_client(settings: &FlinkSettings) -> Result<ClientWithMiddleware, FlinkError> {
    let headers = settings.header_map()?;

    let client_builder = reqwest::Client::builder()
        .pool_idle_timeout(settings.pool_idle_timeout)
        .timeout(settings.request_timeout)
        .default_headers(headers);

    let client_builder = if let Some(pool_max_idle_per_host) = settings.pool_max_idle_per_host {
        client_builder.pool_max_idle_per_host(pool_max_idle_per_host)
    } else {
        client_builder
    };

    let client = client_builder.build()?;

    let builder = ClientBuilder::new(client);
    let builder = if 0 < settings.max_retries {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(settings.max_retries);
        builder.with(RetryTransientMiddleware::new_with_policy(retry_policy))
    } else {
        builder
    };

    Ok(builder.build())
}

struct FlinkContextRef {
    /// Label identifying the Flink cluster in logs.
    pub label: String,
    pub client: ClientWithMiddleware,
    pub request_timeout: Duration,
}

impl fmt::Debug for FlinkContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlinkContextRef")
            .field("label", &self.label)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl FlinkContextRef {
    async fn do_query_json<T>(&self, action: &str, url: &Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .request(Method::GET, url.clone())
            .send()
            .await
            .map_err(|error| FetchError::from_transport(url.clone(), self.request_timeout, error))?;

        flink::log_response(action, url, &response);

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError { status, url: url.clone() });
        }

        let body = response
            .text()
            .await
            .map_err(|error| FetchError::from_transport(url.clone(), self.request_timeout, error.into()))?;

        let result = serde_json::from_str(body.as_str()).map_err(|source| FetchError::Decode { url: url.clone(), source });
        tracing::trace!(%body, is_ok=%result.is_ok(), "Flink response body: {action}");
        result
    }
}
