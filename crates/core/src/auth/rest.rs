//! Authentication against the hosted backend's auth endpoints

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::remote::{ensure_success, RestClient, RestStore};
use crate::Result;

use super::model::{Profile, ProfilePatch, Session, User};
use super::provider::{fetch_profile, normalize_email, patch_profile, AuthProvider};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RestAuth {
    client: RestClient,
    profiles: RestStore,
    session: Arc<RwLock<Option<Session>>>,
}

impl RestAuth {
    pub fn new(client: RestClient) -> Self {
        Self {
            profiles: RestStore::new(client.clone()),
            client,
            session: Arc::new(RwLock::new(None)),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.client.base_url(), path)
    }

    async fn require_user(&self) -> Result<User> {
        self.current_user().await.ok_or(Error::NotAuthenticated)
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn session(&self) -> Option<Session> {
        self.session
            .read()
            .await
            .clone()
            .filter(|session| !session.is_expired())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<()> {
        let email = normalize_email(email)?;
        let resp = self
            .client
            .http()
            .post(self.auth_url("signup"))
            .headers(self.client.headers().await?)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }))
            .send()
            .await?;
        ensure_success(resp, "Sign up").await?;
        info!(%email, "account registered");
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email)?;
        let resp = self
            .client
            .http()
            .post(self.auth_url("token?grant_type=password"))
            .headers(self.client.headers().await?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let resp = ensure_success(resp, "Sign in").await?;
        let token: TokenResponse = resp.json().await?;

        let session = Session {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
            user: User {
                id: token.user.id,
                email: token.user.email.unwrap_or(email),
                created_at: token.user.created_at,
            },
        };
        self.client
            .set_access_token(Some(session.access_token.clone()))
            .await;
        *self.session.write().await = Some(session.clone());
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let headers = self.client.headers().await?;
        self.client.set_access_token(None).await;
        *self.session.write().await = None;

        let resp = self
            .client
            .http()
            .post(self.auth_url("logout"))
            .headers(headers)
            .send()
            .await?;
        if let Err(err) = ensure_success(resp, "Sign out").await {
            warn!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    async fn profile(&self) -> Result<Option<Profile>> {
        let user = self.require_user().await?;
        fetch_profile(&self.profiles, user.id).await
    }

    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile> {
        let user = self.require_user().await?;
        patch_profile(&self.profiles, user.id, patch).await
    }
}
