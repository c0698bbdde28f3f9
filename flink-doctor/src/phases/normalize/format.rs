use chrono::{TimeZone, Utc};

use super::TypedMetric;
use crate::flink::MetricKind;

pub const NOT_AVAILABLE: &str = "N/A";

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 3_600.0;
const SECS_PER_DAY: f64 = 86_400.0;

/// Render milliseconds at the coarsest unit under its next boundary; longer spans also show the
/// raw seconds, e.g. `2.50m (150s)`.
pub fn format_duration(millis: f64) -> String {
    if millis.is_nan() || millis <= 0.0 {
        return NOT_AVAILABLE.to_string();
    }

    let seconds = millis / 1_000.0;
    if seconds < SECS_PER_MINUTE {
        format!("{seconds:.2}s")
    } else if seconds < SECS_PER_HOUR {
        format!("{:.2}m ({seconds:.0}s)", seconds / SECS_PER_MINUTE)
    } else if seconds < SECS_PER_DAY {
        format!("{:.2}h ({seconds:.0}s)", seconds / SECS_PER_HOUR)
    } else {
        format!("{:.2}d ({seconds:.0}s)", seconds / SECS_PER_DAY)
    }
}

/// Scale a byte count by 1024 until under 1024 or at TB. Non-positive counts are `(0.0, "B")`.
pub fn scale_bytes(bytes: f64) -> (f64, &'static str) {
    if bytes.is_nan() || bytes <= 0.0 {
        return (0.0, BYTE_UNITS[0]);
    }

    let mut value = bytes;
    let mut unit_index = 0;
    while 1024.0 <= value && unit_index < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    (value, BYTE_UNITS[unit_index])
}

pub fn format_bytes(bytes: f64) -> String {
    if bytes.is_nan() || bytes <= 0.0 {
        return "0 B".to_string();
    }

    let (value, unit) = scale_bytes(bytes);
    format!("{value:.2} {unit}")
}

/// Epoch milliseconds as a UTC timestamp.
pub fn format_timestamp(millis: i64) -> String {
    if millis <= 0 {
        return NOT_AVAILABLE.to_string();
    }

    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{millis}ms"))
}

pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

pub fn format_opt_percent(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| NOT_AVAILABLE.to_string(), format_percent)
}

/// Display a typed metric according to its kind; absent values render as `N/A`.
pub fn format_metric(metric: &TypedMetric) -> String {
    if let Some(text) = metric.text.as_deref() {
        if metric.kind == MetricKind::Opaque || metric.numeric.is_none() {
            return text.to_string();
        }
    }

    let Some(numeric) = metric.numeric else {
        return NOT_AVAILABLE.to_string();
    };

    match metric.kind {
        MetricKind::Duration => format_duration(numeric.as_f64()),
        MetricKind::ByteCount => format_bytes(numeric.as_f64()),
        MetricKind::Ratio => format_percent(numeric.as_f64()),
        MetricKind::Timestamp => format_timestamp(numeric.as_f64() as i64),
        MetricKind::Counter => numeric.as_i64().map_or_else(|| format!("{:.0}", numeric.as_f64()), |v| v.to_string()),
        MetricKind::Opaque => numeric.to_string(),
    }
}
