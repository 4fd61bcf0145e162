//! Run the build master.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use wheelwright_config::{MasterConfig, load_master_config};
use wheelwright_core::{Catalog, MemoryCatalog};
use wheelwright_db::{PgCatalog, create_pool};
use wheelwright_reactor::{CancellationToken, ReactorOptions, ReplySocket};
use wheelwright_scheduler::{Architect, ArchitectConfig};

use super::DEFAULT_CONFIG;

pub struct MasterArgs {
    pub config: Option<PathBuf>,
    pub database: Option<String>,
    pub build_queue: Option<String>,
    pub dry_run_catalog: Option<PathBuf>,
}

fn load_config(args: &MasterArgs) -> Result<MasterConfig> {
    let mut config = match &args.config {
        Some(path) => load_master_config(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_master_config(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load config file: {}", DEFAULT_CONFIG))?,
        None => MasterConfig::default(),
    };

    if let Some(database) = &args.database {
        config.database = Some(database.clone());
    }
    if let Some(build_queue) = &args.build_queue {
        config.build_queue = build_queue.clone();
    }
    Ok(config)
}

async fn open_catalog(args: &MasterArgs, config: &MasterConfig) -> Result<Arc<dyn Catalog>> {
    if let Some(path) = &args.dry_run_catalog {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        let catalog = MemoryCatalog::from_json(&json)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
        info!(path = %path.display(), "Serving builds from file");
        return Ok(Arc::new(catalog));
    }

    let url = config
        .database
        .as_deref()
        .context("No catalog database configured; set `database` or pass --database")?;
    info!("Connecting to catalog database...");
    let pool = create_pool(url)
        .await
        .context("Failed to connect to catalog database")?;
    info!("Catalog database connected");
    Ok(Arc::new(PgCatalog::new(pool, config.architect.fetch_size)))
}

/// Serve the build queue until Ctrl-C. Returns an error if the queue cannot
/// be bound or the catalog fails mid-scan.
pub async fn run(args: MasterArgs) -> Result<()> {
    let config = load_config(&args)?;
    let catalog = open_catalog(&args, &config).await?;

    let build_queue = ReplySocket::bind("build-queue", &config.build_queue)
        .await
        .context("Failed to bind build queue")?;
    info!(addr = %build_queue.local_addr(), "Build queue listening");

    let architect = Architect::new(
        catalog,
        ArchitectConfig {
            cooldown: config.architect.cooldown,
            queue_capacity: config.architect.queue_capacity,
        },
    );
    let shutdown = CancellationToken::new();
    let mut reactor = architect.into_reactor(
        build_queue,
        ReactorOptions {
            poll_timeout: config.reactor.poll_timeout,
        },
        shutdown.clone(),
    )?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let result = reactor.run().await;
    let stats = reactor.task().stats();
    info!(
        served = stats.served,
        scans = stats.scans_completed,
        evicted = stats.evicted,
        "Build master stopped"
    );
    result.context("Build master failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> MasterArgs {
        MasterArgs {
            config: None,
            database: None,
            build_queue: None,
            dry_run_catalog: None,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = load_config(&MasterArgs {
            database: Some("postgres://localhost/catalog".to_string()),
            build_queue: Some("127.0.0.1:7000".to_string()),
            ..args()
        })
        .unwrap();

        assert_eq!(config.database.as_deref(), Some("postgres://localhost/catalog"));
        assert_eq!(config.build_queue, "127.0.0.1:7000");
    }

    #[test]
    fn test_missing_config_file() {
        let result = load_config(&MasterArgs {
            config: Some(PathBuf::from("/nonexistent/wheelwright.kdl")),
            ..args()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_database_configured() {
        let config = MasterConfig::default();
        assert!(open_catalog(&args(), &config).await.is_err());
    }
}
