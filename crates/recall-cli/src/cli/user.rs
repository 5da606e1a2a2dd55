//! User management commands: create, show, disable/enable, delete.

use anyhow::{Context, Result, bail};
use console::style;
use uuid::Uuid;

use recall_core::repository::user::UserRepository;
use recall_infra::config::vector_store_path;
use recall_infra::vector::lance::LanceVectorStore;
use recall_infra::vector::provider::purge_user_embeddings;
use recall_types::user::{NewUser, User};

use super::render::{print_json, success};
use crate::state::AppState;

/// Resolve a user by id, email, or username.
pub async fn resolve_user(state: &AppState, key: &str) -> Result<User> {
    let user = if let Ok(id) = Uuid::parse_str(key) {
        state.users.get_user(&id).await?
    } else if key.contains('@') {
        state.users.get_user_by_email(key).await?
    } else {
        state.users.get_user_by_username(key).await?
    };

    user.with_context(|| format!("User '{key}' not found"))
}

pub async fn create_user(
    state: &AppState,
    email: String,
    username: String,
    credential_hash: String,
    name: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let user = state
        .users
        .create_user(&NewUser::new(email, username, credential_hash, name))
        .await
        .context("Failed to create user")?;

    if json {
        return print_json(&user);
    }

    success(
        quiet,
        format!(
            "Created user '{}' ({})",
            style(&user.username).cyan().bold(),
            style(user.id).dim()
        ),
    );
    Ok(())
}

pub async fn show_user(state: &AppState, key: &str, json: bool) -> Result<()> {
    let user = resolve_user(state, key).await?;
    let profile = state.users.get_profile(&user.id).await?;

    if json {
        return print_json(&serde_json::json!({
            "user": user,
            "profile": profile,
        }));
    }

    let flag = |ok: bool| {
        if ok {
            format!("{}", style("yes").green())
        } else {
            format!("{}", style("no").red())
        }
    };

    println!();
    println!("  {}", style(&user.username).cyan().bold());
    println!();
    println!("  Id:          {}", user.id);
    println!("  Email:       {}", user.email);
    println!("  Name:        {}", user.full_name.as_deref().unwrap_or("-"));
    println!("  Active:      {}", flag(user.is_active));
    println!("  Verified:    {}", flag(user.is_verified));
    println!("  Created:     {}", user.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "  Last login:  {}",
        user.last_login_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Timezone:    {}", profile.timezone);
    println!("  Language:    {}", profile.language);
    println!();
    Ok(())
}

pub async fn set_active(state: &AppState, key: &str, active: bool, json: bool, quiet: bool) -> Result<()> {
    let user = resolve_user(state, key).await?;
    state.users.set_active(&user.id, active).await?;

    if json {
        return print_json(&serde_json::json!({ "id": user.id, "is_active": active }));
    }

    let verb = if active { "Enabled" } else { "Disabled" };
    success(quiet, format!("{verb} user '{}'", style(&user.username).cyan()));
    Ok(())
}

/// Delete a user, then drop their vectors from the vector store.
///
/// The relational delete is authoritative; a failed vector purge is reported
/// but leaves nothing reachable, since search hits resolve through the store.
pub async fn delete_user(state: &AppState, key: &str, force: bool, json: bool, quiet: bool) -> Result<()> {
    let user = resolve_user(state, key).await?;

    if !force {
        bail!(
            "Refusing to delete '{}' and all of their history without --force",
            user.username
        );
    }

    state.users.delete_user(&user.id).await?;

    let purge = async {
        let store = LanceVectorStore::new(vector_store_path(&state.data_dir)).await?;
        purge_user_embeddings(&store, &user.id).await?;
        anyhow::Ok(())
    }
    .await;
    if let Err(e) = &purge {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to purge user embeddings");
    }

    if json {
        return print_json(&serde_json::json!({
            "id": user.id,
            "deleted": true,
            "embeddings_purged": purge.is_ok(),
        }));
    }

    success(quiet, format!("Deleted user '{}'", style(&user.username).cyan()));
    Ok(())
}
