//! Recall operator CLI entry point.
//!
//! Binary name: `recall`
//!
//! Parses CLI arguments, initializes tracing, the database, and the memory
//! coordinator, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands, SessionCommand, TokenCommand, UserCommand};
use recall_observe::tracing_setup::{directives_for, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(directives_for(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;
    let result = run(&state, cli).await;

    state.shutdown().await;
    shutdown_tracing();
    result
}

async fn run(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    let (json, quiet) = (cli.json, cli.quiet);

    match cli.command {
        Commands::User { action } => match action {
            UserCommand::Create {
                email,
                username,
                credential_hash,
                name,
            } => {
                cli::user::create_user(state, email, username, credential_hash, name, json, quiet)
                    .await?;
            }
            UserCommand::Show { user } => cli::user::show_user(state, &user, json).await?,
            UserCommand::Disable { user } => {
                cli::user::set_active(state, &user, false, json, quiet).await?;
            }
            UserCommand::Enable { user } => {
                cli::user::set_active(state, &user, true, json, quiet).await?;
            }
            UserCommand::Delete { user, force } => {
                cli::user::delete_user(state, &user, force, json, quiet).await?;
            }
        },

        Commands::Session { action } => match action {
            SessionCommand::Open { user, title } => {
                cli::session::open_session(state, &user, title, json, quiet).await?;
            }
            SessionCommand::Close { session_id } => {
                cli::session::close_session(state, session_id, json, quiet).await?;
            }
            SessionCommand::List { user, limit } => {
                cli::session::list_sessions(state, &user, limit, json).await?;
            }
        },

        Commands::Turn {
            session_id,
            content,
            role,
            metadata,
        } => {
            cli::memory::record_turn(state, session_id, &role, content, metadata, json, quiet)
                .await?;
        }

        Commands::Messages {
            session_id,
            limit,
            after,
        } => {
            cli::memory::list_messages(state, session_id, limit, after, json).await?;
        }

        Commands::Search { user, query, top_k } => {
            cli::memory::search(state, &user, &query, top_k, json).await?;
        }

        Commands::Hybrid {
            session_id,
            query,
            recent,
            top_k,
        } => {
            cli::memory::hybrid(state, session_id, &query, recent, top_k, json).await?;
        }

        Commands::Reconcile { watch } => {
            cli::reconcile::reconcile(state, watch, json, quiet).await?;
        }

        Commands::Backfill { session_id, limit } => {
            cli::reconcile::backfill(state, session_id, limit, json, quiet).await?;
        }

        Commands::Pending { limit } => cli::reconcile::pending(state, limit, json).await?,

        Commands::Requeue { message_id } => {
            cli::reconcile::requeue(state, message_id, json, quiet).await?;
        }

        Commands::Tokens { action } => match action {
            TokenCommand::Reap => cli::token::reap(state, json, quiet).await?,
            TokenCommand::Revoke { token_id } => {
                cli::token::revoke(state, token_id, json, quiet).await?;
            }
            TokenCommand::RevokeUser { user } => {
                cli::token::revoke_user(state, &user, json, quiet).await?;
            }
        },
    }

    Ok(())
}
