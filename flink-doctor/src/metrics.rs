use prometheus::Registry;

use crate::flink;
use crate::phases::diagnose;
use crate::Result;

#[tracing::instrument(level = "trace")]
pub fn register_metrics(registry: &Registry) -> Result<()> {
    registry.register(Box::new(flink::FLINK_QUERY_TIME.clone()))?;
    registry.register(Box::new(flink::FLINK_ERRORS.clone()))?;
    registry.register(Box::new(diagnose::DIAGNOSTIC_FINDINGS.clone()))?;
    Ok(())
}
