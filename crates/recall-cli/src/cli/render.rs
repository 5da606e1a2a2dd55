//! Shared terminal rendering for messages and sessions.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;

use recall_types::chat::{ChatMessage, ChatSession, MessageType};

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a green check line, unless quiet.
pub fn success(quiet: bool, text: impl std::fmt::Display) {
    if !quiet {
        println!();
        println!("  {} {}", style("✓").green().bold(), text);
        println!();
    }
}

/// Print an informational line, unless quiet.
pub fn notice(quiet: bool, text: impl std::fmt::Display) {
    if !quiet {
        println!();
        println!("  {} {}", style("i").blue().bold(), text);
        println!();
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn role_cell(message_type: MessageType) -> Cell {
    let cell = Cell::new(message_type.as_str());
    match message_type {
        MessageType::User => cell.fg(Color::Cyan),
        MessageType::Assistant => cell.fg(Color::Green),
        MessageType::System => cell.fg(Color::DarkGrey),
    }
}

pub fn message_table(messages: &[ChatMessage]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Linked").fg(Color::White),
        Cell::new("Id").fg(Color::White),
    ]);

    for message in messages {
        let linked = match (&message.vector_id, message.message_type) {
            (Some(_), _) => Cell::new("yes").fg(Color::Green),
            (None, MessageType::System) => Cell::new("-").fg(Color::DarkGrey),
            (None, _) => Cell::new("pending").fg(Color::Yellow),
        };

        table.add_row(vec![
            Cell::new(message.created_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
            role_cell(message.message_type),
            Cell::new(truncate(&message.content, 60)),
            linked,
            Cell::new(message.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    table
}

pub fn session_table(sessions: &[ChatSession]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Title").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Last activity").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Id").fg(Color::White),
    ]);

    for session in sessions {
        let status = if session.is_active {
            Cell::new("active").fg(Color::Green)
        } else {
            Cell::new("closed").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(truncate(session.title.as_deref().unwrap_or("(untitled)"), 40))
                .fg(Color::Cyan),
            Cell::new(session.created_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(session.updated_at.format("%Y-%m-%d %H:%M").to_string())
                .fg(Color::DarkGrey),
            status,
            Cell::new(session.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_text_on_char_boundary() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }
}
