use klinesync_core::{DatasetStatus, PipelineConfig};
use klinesync_store::{DocumentStore, StoreConfig};
use serde_json::Value;

use crate::error::CliError;

pub fn run(config: &PipelineConfig) -> Result<Value, CliError> {
    let store = DocumentStore::open(StoreConfig::new(config.data_dir.clone()))?;
    let status = DatasetStatus::load(&store)?;
    Ok(serde_json::to_value(status)?)
}
