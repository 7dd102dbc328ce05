//! Single-entity inspection and administration.

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use trendbase_core::{EntityId, EntityStatus};
use trendbase_engine::TrendEngine;

#[derive(Debug, Subcommand)]
pub(crate) enum EntityCommands {
    /// Print an entity with its score breakdown and signals
    Show { id: EntityId },
    /// Fold LOSER into WINNER and delete LOSER
    Merge { winner: EntityId, loser: EntityId },
    /// Delete an entity and its signals
    Delete { id: EntityId },
    /// Record presence on, or absence from, the momentum list
    Momentum { id: EntityId, state: MomentumState },
    /// Override the base score (0-100)
    BaseScore { id: EntityId, score: i64 },
    /// Change the lifecycle status
    Status { id: EntityId, status: StatusArg },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum MomentumState {
    Listed,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum StatusArg {
    Draft,
    Flagged,
    Published,
}

impl From<StatusArg> for EntityStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Draft => EntityStatus::Draft,
            StatusArg::Flagged => EntityStatus::Flagged,
            StatusArg::Published => EntityStatus::Published,
        }
    }
}

pub(crate) async fn run(engine: &TrendEngine, command: EntityCommands) -> anyhow::Result<()> {
    let entity = match command {
        EntityCommands::Show { id } => {
            let detail = engine.entity_detail(id).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            return Ok(());
        }
        EntityCommands::Delete { id } => {
            engine.delete_entity(id).await?;
            println!("deleted entity {id}");
            return Ok(());
        }
        EntityCommands::Merge { winner, loser } => engine.merge_entities(winner, loser).await?,
        EntityCommands::Momentum { id, state } => {
            engine
                .set_momentum_presence(id, state == MomentumState::Listed, Utc::now())
                .await?
        }
        EntityCommands::BaseScore { id, score } => engine.set_base_score(id, score).await?,
        EntityCommands::Status { id, status } => engine.set_status(id, status.into()).await?,
    };

    println!(
        "entity {} \"{}\": status={} base={} current={} peak={} on_list={}",
        entity.id,
        entity.canonical_name,
        entity.status.as_str(),
        entity.base_score,
        entity.effective_score(),
        entity.effective_peak(),
        entity.on_momentum_list
    );
    Ok(())
}
