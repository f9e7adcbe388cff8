use std::path::Path;
use anyhow::{anyhow, Result};

use crate::config::loader::{file_to_config, ServiceConfig};

pub async fn run(config_path: &str) -> Result<ServiceConfig> {
    let path = Path::new(config_path);
    file_to_config(path).await.map_err(|e| anyhow!("Invalid config format: {:#}", e))
}
