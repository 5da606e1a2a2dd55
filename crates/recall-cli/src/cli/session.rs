//! Session commands: open, close, list.

use anyhow::{Context, Result};
use console::style;
use uuid::Uuid;

use recall_core::repository::chat::ChatRepository;

use super::render::{notice, print_json, session_table, success};
use super::user::resolve_user;
use crate::state::AppState;

pub async fn open_session(
    state: &AppState,
    user_key: &str,
    title: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let user = resolve_user(state, user_key).await?;
    let session = state.coordinator.open_session(&user.id, title).await?;

    if json {
        return print_json(&session);
    }

    success(
        quiet,
        format!(
            "Opened session {} for '{}'",
            style(session.id).bold(),
            style(&user.username).cyan()
        ),
    );
    Ok(())
}

pub async fn close_session(state: &AppState, session_id: Uuid, json: bool, quiet: bool) -> Result<()> {
    let session = state
        .coordinator
        .close_session(&session_id)
        .await
        .with_context(|| format!("Failed to close session {session_id}"))?;

    if json {
        return print_json(&session);
    }

    success(quiet, format!("Closed session {}", style(session.id).bold()));
    Ok(())
}

pub async fn list_sessions(state: &AppState, user_key: &str, limit: u32, json: bool) -> Result<()> {
    let user = resolve_user(state, user_key).await?;
    let sessions = state.chat.list_sessions(&user.id, limit).await?;

    if json {
        return print_json(&sessions);
    }

    if sessions.is_empty() {
        notice(
            false,
            format!(
                "No sessions for '{}'. Open one with: {}",
                style(&user.username).cyan(),
                style(format!("recall session open {}", user.username)).yellow()
            ),
        );
        return Ok(());
    }

    println!();
    println!("  Sessions for '{}'", style(&user.username).cyan().bold());
    println!();
    println!("{}", session_table(&sessions));
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}
