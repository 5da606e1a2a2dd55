//! CLI command definitions for the `recall` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! resource (e.g., `recall user create`, `recall session list`).

pub mod memory;
pub mod render;
pub mod reconcile;
pub mod session;
pub mod token;
pub mod user;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Operate a Recall conversational memory store.
#[derive(Parser)]
#[command(name = "recall", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "RECALL_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage users (create, show, disable, enable, delete).
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Manage chat sessions (open, close, list).
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Record one conversational turn and wait for its embedding.
    Turn {
        /// Session the turn belongs to.
        session_id: Uuid,

        /// Message content.
        content: String,

        /// Speaker: user, assistant, or system.
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Metadata document as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Page through a session's messages in chronological order.
    Messages {
        session_id: Uuid,

        /// Maximum messages per page.
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Continue after this cursor (from a previous page).
        #[arg(long)]
        after: Option<String>,
    },

    /// Semantic search over a user's whole history.
    Search {
        /// User id, email, or username.
        user: String,

        /// Query text.
        query: String,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Recent turns of a session plus semantic matches from the owner's history.
    Hybrid {
        session_id: Uuid,

        /// Query text.
        query: String,

        /// How many recent turns to include.
        #[arg(short, long, default_value = "10")]
        recent: u32,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Run one reconciliation pass over due embedding tasks.
    Reconcile {
        /// Keep running passes every `reconcile.interval_secs` until Ctrl+C.
        #[arg(long)]
        watch: bool,
    },

    /// Re-arm and embed every unlinked message of one session.
    Backfill {
        session_id: Uuid,

        #[arg(short, long, default_value = "500")]
        limit: u32,
    },

    /// Show embedding tasks that ran out of retries.
    Pending {
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Give an exhausted embedding task a fresh retry budget.
    Requeue {
        message_id: Uuid,
    },

    /// Refresh token maintenance.
    Tokens {
        #[command(subcommand)]
        action: TokenCommand,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a user.
    Create {
        #[arg(long)]
        email: String,

        #[arg(long)]
        username: String,

        /// Credential hash produced by the auth service.
        #[arg(long)]
        credential_hash: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Show a user and their profile.
    Show {
        /// User id, email, or username.
        user: String,
    },

    /// Soft-disable a user.
    Disable { user: String },

    /// Re-enable a disabled user.
    Enable { user: String },

    /// Delete a user with all sessions, messages, tokens, and embeddings.
    Delete {
        user: String,

        /// Skip the confirmation check.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Open a new session for a user.
    Open {
        user: String,

        #[arg(long)]
        title: Option<String>,
    },

    /// Close an active session.
    Close { session_id: Uuid },

    /// List a user's sessions, newest first.
    List {
        user: String,

        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Revoke every expired refresh token.
    Reap,

    /// Revoke one refresh token by id.
    Revoke { token_id: Uuid },

    /// Revoke every refresh token of one user.
    RevokeUser { user: String },
}
