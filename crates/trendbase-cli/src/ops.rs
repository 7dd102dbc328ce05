use chrono::{DateTime, Utc};
use trendbase_core::{RecalcRun, RecalcTrigger, SectionKind};
use trendbase_engine::TrendEngine;

fn print_run(run: &RecalcRun) {
    println!(
        "run {} ({}): {} processed, {} updated, {} unchanged, {} failed",
        run.id,
        run.status.as_str(),
        run.totals.processed,
        run.totals.updated,
        run.totals.unchanged,
        run.totals.failed
    );
    if let Some(message) = &run.error_message {
        println!("  error: {message}");
    }
}

pub(crate) async fn run_recalculate(engine: &TrendEngine, now: DateTime<Utc>) -> anyhow::Result<()> {
    let run = engine.recalculate_all(RecalcTrigger::Cli, now).await?;
    print_run(&run);
    Ok(())
}

pub(crate) async fn run_reconcile(engine: &TrendEngine, now: DateTime<Utc>) -> anyhow::Result<()> {
    let report = engine.reconcile(RecalcTrigger::Cli, now).await?;
    println!(
        "reconcile: {} duplicate keys, {} merged, {} merge failures, {} rescored, {} rescore failures",
        report.duplicate_keys,
        report.merged_duplicates,
        report.merge_failed,
        report.rescored,
        report.rescore_failed
    );
    print_run(&report.recalc);
    Ok(())
}

pub(crate) async fn print_sections(engine: &TrendEngine, limit: usize) {
    let limit = limit.clamp(1, 50);
    let sections = engine.homepage_sections(limit, Utc::now()).await;

    for kind in SectionKind::ALL {
        let entries = sections.get(kind);
        println!("{} ({})", kind.title(), entries.len());
        for entry in entries {
            println!(
                "  #{:<6} {:>3}  {}{}",
                entry.entity_id,
                entry.score,
                entry.canonical_name,
                entry
                    .brand
                    .as_deref()
                    .map(|b| format!(" [{b}]"))
                    .unwrap_or_default()
            );
        }
    }
}
