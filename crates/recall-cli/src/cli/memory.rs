//! Conversation memory commands: record a turn, page messages, and the
//! semantic and hybrid retrieval modes.

use anyhow::{Context, Result};
use console::style;
use uuid::Uuid;

use recall_core::repository::vector_index::VectorReferenceIndex;
use recall_types::chat::{MessageCursor, MessageType, MessageWindow};
use recall_types::document::Document;

use super::render::{message_table, notice, print_json};
use super::user::resolve_user;
use crate::state::AppState;

/// Record a turn, then wait for the inline embedding attempt to finish.
pub async fn record_turn(
    state: &AppState,
    session_id: Uuid,
    role: &str,
    content: String,
    metadata: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let message_type: MessageType = role.parse()?;
    let metadata = metadata
        .map(|raw| {
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("--metadata must be a JSON object")?;
            Ok::<_, anyhow::Error>(Document::from_value(value)?)
        })
        .transpose()?;

    let session = state
        .coordinator
        .get_session(&session_id)
        .await?
        .with_context(|| format!("Session {session_id} not found"))?;

    // The turn is recorded either way; a model that fails to load leaves it pending.
    if message_type.is_embeddable() {
        if let Err(e) = state.coordinator.warm_provider().await {
            tracing::warn!(error = %e, "Embedding model unavailable");
        }
    }

    let message = state
        .coordinator
        .record_turn(session_id, session.user_id, message_type, content, metadata)
        .await?;
    state.coordinator.drain().await;

    let linked = state.index.lookup_embedding(&message.id).await?;

    if json {
        return print_json(&serde_json::json!({
            "message": message,
            "vector_id": linked,
        }));
    }

    if quiet {
        return Ok(());
    }

    println!();
    println!("  {} Recorded {} turn {}", style("✓").green().bold(), message_type, style(message.id).dim());
    match (linked, message_type.is_embeddable()) {
        (Some(id), _) => println!("  {} Embedding linked: {}", style("✓").green(), style(id).dim()),
        (None, true) => println!(
            "  {} Embedding pending; run {} to retry",
            style("!").yellow().bold(),
            style("recall reconcile").yellow()
        ),
        (None, false) => {}
    }
    println!();
    Ok(())
}

pub async fn list_messages(
    state: &AppState,
    session_id: Uuid,
    limit: u32,
    after: Option<String>,
    json: bool,
) -> Result<()> {
    let window = match after {
        Some(token) => MessageWindow::after(MessageCursor::decode(&token)?, limit),
        None => MessageWindow::first(limit),
    };

    let page = state
        .coordinator
        .retrieve_chronological(&session_id, &window)
        .await?;

    if json {
        return print_json(&page);
    }

    if page.messages.is_empty() {
        notice(false, format!("No messages in session {session_id}"));
        return Ok(());
    }

    println!();
    println!("{}", message_table(&page.messages));
    if let Some(cursor) = &page.next_cursor {
        println!();
        println!(
            "  More: {}",
            style(format!("recall messages {session_id} --after {}", cursor.encode())).yellow()
        );
    }
    println!();
    Ok(())
}

pub async fn search(state: &AppState, user_key: &str, query: &str, top_k: usize, json: bool) -> Result<()> {
    let user = resolve_user(state, user_key).await?;
    let query_embedding = state.provider.embed_query(query).await?;

    let messages = state
        .coordinator
        .retrieve_semantic(&user.id, &query_embedding, top_k)
        .await?;

    if json {
        return print_json(&messages);
    }

    if messages.is_empty() {
        notice(false, format!("No matches for '{query}'"));
        return Ok(());
    }

    println!();
    println!("  Matches for '{}', most similar first", style(query).cyan());
    println!();
    println!("{}", message_table(&messages));
    println!();
    Ok(())
}

pub async fn hybrid(
    state: &AppState,
    session_id: Uuid,
    query: &str,
    recent: u32,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let query_embedding = state.provider.embed_query(query).await?;

    let messages = state
        .coordinator
        .retrieve_hybrid(&session_id, &query_embedding, recent, top_k)
        .await?;

    if json {
        return print_json(&messages);
    }

    if messages.is_empty() {
        notice(false, "Nothing to recall for this session");
        return Ok(());
    }

    println!();
    println!(
        "  Last {} turns, then matches for '{}'",
        style(recent).bold(),
        style(query).cyan()
    );
    println!();
    println!("{}", message_table(&messages));
    println!();
    Ok(())
}
