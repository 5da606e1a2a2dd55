//! Refresh token maintenance commands.

use anyhow::Result;
use chrono::Utc;
use console::style;

use uuid::Uuid;

use super::render::{print_json, success};
use super::user::resolve_user;
use crate::state::AppState;

pub async fn reap(state: &AppState, json: bool, quiet: bool) -> Result<()> {
    let reaped = state.token_service.reap_expired(Utc::now()).await?;

    if json {
        return print_json(&serde_json::json!({ "reaped": reaped }));
    }

    success(quiet, format!("Revoked {} expired token(s)", style(reaped).bold()));
    Ok(())
}

/// Idempotent: revoking an already revoked token succeeds.
pub async fn revoke(state: &AppState, token_id: Uuid, json: bool, quiet: bool) -> Result<()> {
    state.token_service.revoke(&token_id).await?;

    if json {
        return print_json(&serde_json::json!({ "token_id": token_id, "revoked": true }));
    }

    success(quiet, format!("Revoked token {}", style(token_id).bold()));
    Ok(())
}

pub async fn revoke_user(state: &AppState, user_key: &str, json: bool, quiet: bool) -> Result<()> {
    let user = resolve_user(state, user_key).await?;
    let revoked = state.token_service.revoke_all_for_user(&user.id).await?;

    if json {
        return print_json(&serde_json::json!({ "user_id": user.id, "revoked": revoked }));
    }

    success(
        quiet,
        format!(
            "Revoked {} token(s) for '{}'",
            style(revoked).bold(),
            style(&user.username).cyan()
        ),
    );
    Ok(())
}
