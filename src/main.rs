//! mcpsync - MCP Registry Synchronization Service
//!
//! Continuously mirrors MCP server descriptions from heterogeneous upstream
//! sources (Kubernetes custom resources, Git repositories, HTTP APIs,
//! ConfigMaps, local files) into a canonical PostgreSQL store, and serves
//! the stored catalog through a read HTTP API.

use clap::{Parser, Subcommand};
use mcpsync::{app, config, storage, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mcpsync")]
#[command(about = "MCP registry synchronization service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "MCPSYNC_CONFIG", default_value = "mcpsync.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MCPSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync engine and the read API
    Serve,

    /// Apply database schema migrations
    Migrate,

    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Serve => {
            info!("mcpsync v{} starting", env!("CARGO_PKG_VERSION"));
            let config = config::Config::load(&cli.config)?;
            info!(
                registry = %config.registry_name,
                source = %config.source.source_type,
                "configuration loaded"
            );
            app::App::build(config).await?.run().await?;
        }

        Commands::Migrate => {
            let config = config::Config::load(&cli.config)?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(2)
                .connect(&config.database.migration_url())
                .await?;
            storage::migrations::run_migrations(&pool).await?;
            println!("migrations applied");
        }

        Commands::Validate { config } => {
            let path = config.unwrap_or(cli.config);
            match config::Config::load(&path) {
                Ok(_) => {
                    println!("configuration valid: {}", path.display());
                }
                Err(e) => {
                    eprintln!("configuration invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("mcpsync {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
