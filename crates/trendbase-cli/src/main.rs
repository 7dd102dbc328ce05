mod entity;
mod ingest;
mod ops;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trendbase_core::{AppConfig, EntityStore};
use trendbase_db::PgEntityStore;
use trendbase_engine::{EngineConfig, TrendEngine};

use crate::entity::EntityCommands;

#[derive(Debug, Parser)]
#[command(name = "trendbase-cli")]
#[command(about = "Trend aggregation and scoring operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Ingest raw signal records from a JSON array or NDJSON file
    Ingest {
        file: PathBuf,
        /// Validate records and report without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Recompute decayed scores for every tracked entity
    Recalculate {
        /// Evaluate as of this RFC 3339 instant instead of the current time
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Merge duplicate keys, recompose base scores, then recalculate
    Reconcile {
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Print the homepage sections
    Sections {
        #[arg(long, default_value = "12")]
        limit: usize,
    },
    /// Inspect or administer a single entity
    Entity {
        #[command(subcommand)]
        command: EntityCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("trendbase-cli: no command given; see --help");
        return Ok(());
    };

    // Dry-run ingest is pure validation and needs neither config nor a database.
    if let Commands::Ingest {
        ref file,
        dry_run: true,
    } = command
    {
        init_tracing("info")?;
        return ingest::run_dry(file).await;
    }

    let config = trendbase_core::load_app_config()?;
    init_tracing(&config.log_level)?;

    match command {
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let pool = trendbase_db::connect_pool_from_config(&config).await?;
            let applied = trendbase_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            let pool = trendbase_db::connect_pool_from_config(&config).await?;
            trendbase_db::health_check(&pool).await?;
            println!("database ok");
        }
        Commands::Ingest { file, .. } => {
            let engine = build_engine(&config).await?;
            ingest::run(&engine, &file).await?;
        }
        Commands::Recalculate { now } => {
            let engine = build_engine(&config).await?;
            ops::run_recalculate(&engine, now.unwrap_or_else(Utc::now)).await?;
        }
        Commands::Reconcile { now } => {
            let engine = build_engine(&config).await?;
            ops::run_reconcile(&engine, now.unwrap_or_else(Utc::now)).await?;
        }
        Commands::Sections { limit } => {
            let engine = build_engine(&config).await?;
            ops::print_sections(&engine, limit).await;
        }
        Commands::Entity { command } => {
            let engine = build_engine(&config).await?;
            entity::run(&engine, command).await?;
        }
    }

    Ok(())
}

fn init_tracing(fallback: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<TrendEngine> {
    let pool = trendbase_db::connect_pool_from_config(config).await?;
    let store: Arc<dyn EntityStore> = Arc::new(PgEntityStore::new(pool));
    Ok(TrendEngine::new(store, EngineConfig::from_app_config(config)))
}

#[cfg(test)]
mod tests;
