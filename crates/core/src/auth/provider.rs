//! Authentication provider trait
//!
//! Defines the interface of the authentication collaborator.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::Error;
use crate::remote::{decode, decode_all, encode, Query, RemoteStore, Table};
use crate::Result;

use super::model::{Profile, ProfilePatch, Session, User};

/// Session management and profile access
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The active, unexpired session, if any
    async fn session(&self) -> Option<Session>;

    /// The signed-in user, if any
    async fn current_user(&self) -> Option<User> {
        self.session().await.map(|session| session.user)
    }

    /// Register a new account; does not sign in
    async fn sign_up(&self, email: &str, password: &str, full_name: Option<String>)
        -> Result<()>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// End the current session
    async fn sign_out(&self) -> Result<()>;

    /// Profile of the signed-in user
    async fn profile(&self) -> Result<Option<Profile>>;

    /// Update the signed-in user's profile
    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile>;
}

pub(crate) async fn fetch_profile(
    store: &dyn RemoteStore,
    user_id: Uuid,
) -> Result<Option<Profile>> {
    let rows = store
        .select(Table::Profiles, &Query::new().eq("id", user_id))
        .await?;
    Ok(decode_all::<Profile>(rows)?.into_iter().next())
}

pub(crate) async fn insert_profile(
    store: &dyn RemoteStore,
    user: &User,
    full_name: Option<String>,
) -> Result<Profile> {
    let row = store
        .insert(
            Table::Profiles,
            json!({
                "id": user.id,
                "email": user.email,
                "full_name": full_name,
            }),
        )
        .await?;
    decode(row)
}

pub(crate) async fn patch_profile(
    store: &dyn RemoteStore,
    user_id: Uuid,
    patch: &ProfilePatch,
) -> Result<Profile> {
    let mut profile = fetch_profile(store, user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Profile {}", user_id)))?;

    let now = Utc::now();
    let mut row = encode(patch)?;
    row["updated_at"] = json!(now);
    store.update(Table::Profiles, user_id, row).await?;

    profile.apply(patch);
    profile.updated_at = now;
    Ok(profile)
}

pub(crate) fn normalize_email(email: &str) -> Result<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return Err(Error::Validation("Invalid email".to_string()));
    }
    Ok(normalized)
}

pub(crate) fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 6 {
        return Err(Error::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}
