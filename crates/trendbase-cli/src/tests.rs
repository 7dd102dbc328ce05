use super::*;
use crate::entity::{MomentumState, StatusArg};

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["trendbase-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["trendbase-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_ingest_with_dry_run() {
    let cli = Cli::try_parse_from(["trendbase-cli", "ingest", "signals.ndjson", "--dry-run"])
        .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Ingest { file, dry_run }) => {
            assert_eq!(file, PathBuf::from("signals.ndjson"));
            assert!(dry_run);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_recalculate_with_explicit_now() {
    let cli = Cli::try_parse_from([
        "trendbase-cli",
        "recalculate",
        "--now",
        "2026-04-15T00:00:00Z",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Recalculate { now: Some(now) }) => {
            assert_eq!(now.to_rfc3339(), "2026-04-15T00:00:00+00:00");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn rejects_malformed_now() {
    assert!(Cli::try_parse_from(["trendbase-cli", "reconcile", "--now", "yesterday"]).is_err());
}

#[test]
fn sections_limit_defaults_to_twelve() {
    let cli =
        Cli::try_parse_from(["trendbase-cli", "sections"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Sections { limit: 12 })));
}

#[test]
fn parses_entity_merge() {
    let cli = Cli::try_parse_from(["trendbase-cli", "entity", "merge", "4", "9"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Entity {
            command: EntityCommands::Merge { winner: 4, loser: 9 }
        })
    ));
}

#[test]
fn parses_entity_momentum_and_status_values() {
    let cli = Cli::try_parse_from(["trendbase-cli", "entity", "momentum", "3", "dropped"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Entity {
            command: EntityCommands::Momentum {
                id: 3,
                state: MomentumState::Dropped
            }
        })
    ));

    let cli = Cli::try_parse_from(["trendbase-cli", "entity", "status", "3", "published"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Entity {
            command: EntityCommands::Status {
                id: 3,
                status: StatusArg::Published
            }
        })
    ));

    assert!(Cli::try_parse_from(["trendbase-cli", "entity", "status", "3", "live"]).is_err());
}

#[test]
fn parses_entity_base_score() {
    let cli = Cli::try_parse_from(["trendbase-cli", "entity", "base-score", "7", "55"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Entity {
            command: EntityCommands::BaseScore { id: 7, score: 55 }
        })
    ));
}

#[test]
fn no_command_is_allowed() {
    let cli = Cli::try_parse_from(["trendbase-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}
