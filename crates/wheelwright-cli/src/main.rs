//! wheelwright build master CLI.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wheelwright")]
#[command(about = "Build master for a distributed wheel build farm", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the build master until interrupted
    Master {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Catalog database URL
        #[arg(long, env = "WHEELWRIGHT_DATABASE_URL")]
        database: Option<String>,
        /// Address the build queue listens on
        #[arg(long, env = "WHEELWRIGHT_BUILD_QUEUE")]
        build_queue: Option<String>,
        /// Serve builds from a JSON file instead of the catalog database
        #[arg(long)]
        dry_run_catalog: Option<PathBuf>,
    },
    /// Ask the build queue for one build
    Request {
        /// ABI tag to ask for
        abi: String,
        /// Address of the build queue
        #[arg(long, env = "WHEELWRIGHT_BUILD_QUEUE", default_value = "127.0.0.1:5555")]
        build_queue: String,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = commands::DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Master {
            config,
            database,
            build_queue,
            dry_run_catalog,
        } => {
            commands::master::run(commands::master::MasterArgs {
                config,
                database,
                build_queue,
                dry_run_catalog,
            })
            .await?;
        }
        Commands::Request { abi, build_queue } => {
            commands::request(&build_queue, &abi).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
