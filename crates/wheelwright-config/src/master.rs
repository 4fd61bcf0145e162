//! Build master configuration.
//!
//! ```kdl
//! database "postgres://wheelwright@localhost/wheelwright"
//! build-queue "0.0.0.0:5555"
//! architect {
//!     cooldown-secs 30
//!     queue-capacity 1000
//!     fetch-size 100
//! }
//! reactor {
//!     poll-timeout-ms 50
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BUILD_QUEUE: &str = "0.0.0.0:5555";

/// Build master configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Catalog database URL.
    pub database: Option<String>,
    /// Address the build queue listens on.
    pub build_queue: String,
    pub architect: ArchitectSettings,
    pub reactor: ReactorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectSettings {
    pub cooldown: Duration,
    pub queue_capacity: usize,
    /// Rows fetched from the catalog cursor per round trip.
    pub fetch_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactorSettings {
    pub poll_timeout: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            database: None,
            build_queue: DEFAULT_BUILD_QUEUE.to_string(),
            architect: ArchitectSettings::default(),
            reactor: ReactorSettings::default(),
        }
    }
}

impl Default for ArchitectSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            queue_capacity: 1000,
            fetch_size: 100,
        }
    }
}

impl Default for ReactorSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(50),
        }
    }
}

/// Read and parse a configuration file.
pub fn load_master_config(path: impl AsRef<Path>) -> ConfigResult<MasterConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_master_config(&content)
}

/// Parse a build master configuration from KDL text. Unknown nodes are
/// ignored; anything not given keeps its default.
pub fn parse_master_config(kdl: &str) -> ConfigResult<MasterConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = MasterConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "database" => {
                config.database = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("database url".to_string()))?,
                );
            }
            "build-queue" | "build_queue" => {
                config.build_queue = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("build-queue address".to_string()))?;
            }
            "architect" => parse_architect(node, &mut config.architect)?,
            "reactor" => parse_reactor(node, &mut config.reactor)?,
            _ => {}
        }
    }

    Ok(config)
}

fn parse_architect(node: &KdlNode, settings: &mut ArchitectSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        match child.name().value() {
            "cooldown-secs" => {
                settings.cooldown = Duration::from_secs(get_u64_arg(child, "cooldown-secs")?);
            }
            "queue-capacity" => {
                let capacity = get_positive_arg(child, "queue-capacity")?;
                settings.queue_capacity =
                    usize::try_from(capacity).map_err(|_| ConfigError::InvalidValue {
                        field: "queue-capacity".to_string(),
                        message: format!("{} is too large", capacity),
                    })?;
            }
            "fetch-size" => {
                let size = get_positive_arg(child, "fetch-size")?;
                settings.fetch_size =
                    u32::try_from(size).map_err(|_| ConfigError::InvalidValue {
                        field: "fetch-size".to_string(),
                        message: format!("{} is too large", size),
                    })?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_reactor(node: &KdlNode, settings: &mut ReactorSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        if child.name().value() == "poll-timeout-ms" {
            settings.poll_timeout =
                Duration::from_millis(get_positive_arg(child, "poll-timeout-ms")?);
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    get_first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_u64_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = get_first_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    let integer = value.as_integer().ok_or_else(|| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("expected an integer, got {}", value),
    })?;
    u64::try_from(integer).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is out of range", integer),
    })
}

fn get_positive_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    match get_u64_arg(node, field)? {
        0 => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}
