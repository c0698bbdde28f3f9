use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::flink::FlinkError;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(test, derive(PartialEq))]
pub struct FlinkSettings {
    #[serde(default = "FlinkSettings::default_label")]
    pub label: String,

    /// JobManager REST endpoint the session is initialized against.
    #[serde(default = "FlinkSettings::default_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,

    /// Transient-failure retries performed by the HTTP client middleware. Zero disables the
    /// middleware.
    #[serde(default = "FlinkSettings::default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "FlinkSettings::default_request_timeout", rename = "request_timeout_secs")]
    #[serde_as(as = "DurationSeconds")]
    pub request_timeout: Duration,

    #[serde(default, rename = "pool_idle_timeout_secs", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<DurationSeconds>")]
    pub pool_idle_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_max_idle_per_host: Option<usize>,

    /// Ceiling on metric names requested per metrics query.
    #[serde(default = "FlinkSettings::default_metrics_batch_size")]
    pub metrics_batch_size: usize,
}

impl Default for FlinkSettings {
    fn default() -> Self {
        Self {
            label: Self::default_label(),
            endpoint: Self::default_endpoint(),
            headers: Vec::default(),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            pool_idle_timeout: None,
            pool_max_idle_per_host: None,
            metrics_batch_size: Self::DEFAULT_METRICS_BATCH_SIZE,
        }
    }
}

impl FlinkSettings {
    const DEFAULT_LABEL: &'static str = "flink";
    const DEFAULT_ENDPOINT: &'static str = "http://localhost:8081";
    const DEFAULT_MAX_RETRIES: u32 = 0;
    const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    const DEFAULT_METRICS_BATCH_SIZE: usize = 50;

    pub fn default_label() -> String {
        Self::DEFAULT_LABEL.to_string()
    }

    pub fn default_endpoint() -> String {
        Self::DEFAULT_ENDPOINT.to_string()
    }

    pub const fn default_max_retries() -> u32 {
        Self::DEFAULT_MAX_RETRIES
    }

    pub const fn default_request_timeout() -> Duration {
        Self::DEFAULT_REQUEST_TIMEOUT
    }

    pub const fn default_metrics_batch_size() -> usize {
        Self::DEFAULT_METRICS_BATCH_SIZE
    }

    pub fn header_map(&self) -> Result<HeaderMap, FlinkError> {
        let mut result = HeaderMap::with_capacity(self.headers.len());

        for (k, v) in self.headers.iter() {
            let name = HeaderName::from_str(k.as_str()).map_err(|err| FlinkError::InvalidHeader(format!("{k}: {err}")))?;
            let value =
                HeaderValue::from_str(v.as_str()).map_err(|err| FlinkError::InvalidHeader(format!("{k}: {err}")))?;
            result.insert(name, value);
        }

        Ok(result)
    }
}
