//! Embedding reconciliation commands: reconcile, backfill, pending, requeue.

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use recall_core::memory::reconcile::ReconcileReport;
use recall_core::repository::vector_index::VectorReferenceIndex;

use super::render::{notice, print_json, success};
use crate::state::AppState;

fn print_report(report: &ReconcileReport, json: bool, quiet: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "  Attempted {}  linked {}  retrying {}  exhausted {}  dropped {}",
        style(report.attempted).bold(),
        style(report.linked).green(),
        style(report.failed).yellow(),
        style(report.exhausted).red(),
        style(report.dropped).dim()
    );
    println!();
    Ok(())
}

/// One pass, or with `watch` a pass every interval until Ctrl+C.
pub async fn reconcile(state: &AppState, watch: bool, json: bool, quiet: bool) -> Result<()> {
    if watch || state.index.pending_count().await? > 0 {
        state.coordinator.warm_provider().await?;
    }

    if !watch {
        let report = state.coordinator.reconcile_once(Utc::now()).await?;
        return print_report(&report, json, quiet);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    notice(
        quiet || json,
        format!(
            "Reconciling every {}s. Press Ctrl+C to stop.",
            state.config.reconcile.interval_secs
        ),
    );
    state.coordinator.run_reconciler(cancel).await;
    Ok(())
}

pub async fn backfill(state: &AppState, session_id: Uuid, limit: u32, json: bool, quiet: bool) -> Result<()> {
    state.coordinator.warm_provider().await?;
    let report = state.coordinator.backfill_session(&session_id, limit).await?;
    print_report(&report, json, quiet)
}

/// Operator view of exhausted tasks.
pub async fn pending(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let exhausted = state.index.exhausted_pending(limit).await?;
    let live = state.index.pending_count().await?;

    if json {
        return print_json(&serde_json::json!({
            "pending": live,
            "exhausted": exhausted,
        }));
    }

    println!();
    println!("  {} task(s) awaiting an embedding", style(live).bold());

    if exhausted.is_empty() {
        println!("  {} No exhausted tasks", style("✓").green());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Message").fg(Color::White),
        Cell::new("Session").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Last error").fg(Color::White),
    ]);

    for task in &exhausted {
        table.add_row(vec![
            Cell::new(task.message_id.to_string()).fg(Color::Cyan),
            Cell::new(task.session_id.to_string()).fg(Color::DarkGrey),
            Cell::new(task.attempt_count.to_string()).fg(Color::Red),
            Cell::new(task.last_error.as_deref().unwrap_or("-")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  Retry one with {}",
        style("recall requeue <message-id>").yellow()
    );
    println!();
    Ok(())
}

pub async fn requeue(state: &AppState, message_id: Uuid, json: bool, quiet: bool) -> Result<()> {
    state.index.requeue(&message_id, Utc::now()).await?;

    if json {
        return print_json(&serde_json::json!({ "message_id": message_id, "requeued": true }));
    }

    success(
        quiet,
        format!("Requeued {}; the next reconcile pass will retry it", style(message_id).bold()),
    );
    Ok(())
}
