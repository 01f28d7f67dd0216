use std::sync::Arc;

use klinesync_core::{Pipeline, PipelineConfig, ReqwestHttpClient, RunMode};
use serde_json::Value;

use crate::error::CliError;

pub async fn run(config: PipelineConfig, mode: RunMode) -> Result<Value, CliError> {
    let mut pipeline = Pipeline::from_config(config, Arc::new(ReqwestHttpClient::new()))?;
    let report = pipeline.run(mode).await?;

    for (exchange, source) in &report.sources {
        if !source.complete {
            tracing::warn!(%exchange, records = source.records, "series is partial");
        }
    }

    Ok(serde_json::to_value(report)?)
}
