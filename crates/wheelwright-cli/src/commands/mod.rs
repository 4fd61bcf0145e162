//! CLI command implementations.

pub mod master;

use anyhow::{Context, Result};
use std::path::Path;
use wheelwright_scheduler::BuildQueueClient;

/// Configuration file picked up from the working directory when present.
pub const DEFAULT_CONFIG: &str = "wheelwright.kdl";

pub async fn request(build_queue: &str, abi: &str) -> Result<()> {
    let mut client = BuildQueueClient::connect(build_queue)
        .await
        .with_context(|| format!("Failed to reach build queue at {}", build_queue))?;
    match client.request(abi).await? {
        Some(job) => println!("{} {}", job.package, job.version),
        None => println!("no work for {}", abi),
    }
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    match wheelwright_config::load_master_config(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
