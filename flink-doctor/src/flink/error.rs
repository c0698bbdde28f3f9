use std::borrow::Cow;
use std::time::Duration;

use either::{Either, Left, Right};
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

/// Hierarchical error label used for the `error_type` dimension of error metrics, e.g.,
/// `flink::fetch::http::timeout`.
pub trait MetricLabel {
    fn slug(&self) -> Cow<'static, str>;

    fn next(&self) -> Either<Cow<'static, str>, Box<&dyn MetricLabel>>;

    fn label(&self) -> String {
        let tail = match self.next() {
            Left(leaf) => leaf.into_owned(),
            Right(nested) => nested.label(),
        };
        format!("{}::{}", self.slug(), tail)
    }
}

/// Failure communicating with the Flink monitoring API. None of these are retried by the core.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network failure calling Flink API at {url}: {source}")]
    NetworkFailure {
        url: Url,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("Flink API call to {url} failed to complete within timeout of {timeout:?}")]
    Timeout { url: Url, timeout: Duration },

    #[error("Flink API responded to {url} with status {status}")]
    ServerError { status: StatusCode, url: Url },

    #[error("failed processing Flink API JSON from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Classify a transport failure, separating out timeouts.
    pub fn from_transport(url: Url, timeout: Duration, error: reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Reqwest(ref err) if err.is_timeout() => Self::Timeout { url, timeout },
            source => Self::NetworkFailure { url, source },
        }
    }

    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server rejected the request itself (4xx), as opposed to failing to serve it.
    pub fn is_client_error(&self) -> bool {
        self.status().map_or(false, |status| status.is_client_error())
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl MetricLabel for FetchError {
    fn slug(&self) -> Cow<'static, str> {
        "fetch".into()
    }

    fn next(&self) -> Either<Cow<'static, str>, Box<&dyn MetricLabel>> {
        match self {
            Self::NetworkFailure { .. } => Left("http::network".into()),
            Self::Timeout { .. } => Left("http::timeout".into()),
            Self::ServerError { status, .. } if status.is_client_error() => Left("http::client_error".into()),
            Self::ServerError { .. } => Left("http::server_error".into()),
            Self::Decode { .. } => Left("http::json".into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum FlinkError {
    #[error("Flink connection is not initialized - initialize with a JobManager endpoint first")]
    NotInitialized,

    #[error("invalid Flink endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to connect to Flink at {endpoint}: {source}")]
    Connection {
        endpoint: Url,
        #[source]
        source: FetchError,
    },

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("failed to fetch Flink metric {metric}: {source}")]
    MetricFetch {
        metric: String,
        #[source]
        source: FetchError,
    },

    #[error("{0} id must not be empty")]
    EmptyResourceId(&'static str),

    #[error("invalid request header: {0}")]
    InvalidHeader(String),

    #[error("failed to build Flink HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl FlinkError {
    /// The underlying communication failure, if any.
    pub const fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Connection { source, .. } | Self::MetricFetch { source, .. } | Self::Fetch(source) => Some(source),
            _ => None,
        }
    }
}

impl MetricLabel for FlinkError {
    fn slug(&self) -> Cow<'static, str> {
        "flink".into()
    }

    fn next(&self) -> Either<Cow<'static, str>, Box<&dyn MetricLabel>> {
        match self {
            Self::NotInitialized => Left("session::not_initialized".into()),
            Self::InvalidEndpoint { .. } => Left("session::endpoint".into()),
            Self::Connection { source, .. } => Right(Box::new(source)),
            Self::Fetch(err) => Right(Box::new(err)),
            Self::MetricFetch { source, .. } => Right(Box::new(source)),
            Self::EmptyResourceId(_) => Left("resource::empty_id".into()),
            Self::InvalidHeader(_) => Left("http::header".into()),
            Self::HttpClient(_) => Left("http::client".into()),
        }
    }
}
