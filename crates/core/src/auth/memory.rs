//! In-process authentication provider
//!
//! Accounts live in memory with salted SHA-256 password hashes; sessions are
//! HS256 tokens checked on every access, so an expired token reads as signed
//! out. Profiles are rows of the `profiles` table in the given remote store.
//! Accounts can be persisted to a JSON file; sessions never are.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::remote::RemoteStore;
use crate::Result;

use super::model::{Profile, ProfilePatch, Session, User};
use super::provider::{
    fetch_profile, insert_profile, normalize_email, patch_profile, validate_password,
    AuthProvider,
};

pub const DEFAULT_AUTH_SECRET: &str = "dev-auth-secret-change-me";
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    email: String,
    exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    user: User,
    password_hash: String,
}

#[derive(Debug, Default)]
struct AuthState {
    accounts: HashMap<Uuid, Account>,
    session: Option<Session>,
}

#[derive(Clone)]
pub struct MemoryAuth {
    state: Arc<RwLock<AuthState>>,
    profiles: Arc<dyn RemoteStore>,
    accounts_path: Option<PathBuf>,
    secret: String,
    session_ttl_seconds: i64,
}

impl MemoryAuth {
    pub fn new(profiles: Arc<dyn RemoteStore>) -> Self {
        Self {
            state: Arc::new(RwLock::new(AuthState::default())),
            profiles,
            accounts_path: None,
            secret: DEFAULT_AUTH_SECRET.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    /// Load accounts from a JSON file, creating it on the first sign-up
    pub async fn open(profiles: Arc<dyn RemoteStore>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let accounts = load_accounts(&path).await?;
        let auth = Self::new(profiles);
        {
            let mut state = auth.state.write().await;
            state.accounts = accounts
                .into_iter()
                .map(|account| (account.user.id, account))
                .collect();
        }
        Ok(Self {
            accounts_path: Some(path),
            ..auth
        })
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_session_ttl(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    fn issue_token(&self, user: &User) -> Result<(String, DateTime<Utc>)> {
        let expires_at = Utc::now() + Duration::seconds(self.session_ttl_seconds);
        let exp = usize::try_from(expires_at.timestamp())
            .map_err(|_| Error::Remote("Failed to encode token expiration".to_string()))?;
        let claims = SessionClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|err| Error::Remote(format!("Failed to encode session token: {}", err)))?;
        Ok((token, expires_at))
    }

    fn verify_token(&self, token: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .ok()
        .map(|decoded| decoded.claims)
    }

    async fn require_user(&self) -> Result<User> {
        self.current_user().await.ok_or(Error::NotAuthenticated)
    }

    async fn persist_accounts(&self, state: &AuthState) -> Result<()> {
        let Some(path) = &self.accounts_path else {
            return Ok(());
        };
        let accounts: Vec<&Account> = state.accounts.values().collect();
        let content = serde_json::to_string_pretty(&accounts)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

async fn load_accounts(path: &Path) -> Result<Vec<Account>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn session(&self) -> Option<Session> {
        let session = self.state.read().await.session.clone()?;
        let claims = self.verify_token(&session.access_token)?;
        (claims.sub == session.user.id.to_string()).then_some(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<()> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        let user = {
            let mut state = self.state.write().await;
            if state
                .accounts
                .values()
                .any(|account| account.user.email == email)
            {
                return Err(Error::Remote("User already registered".to_string()));
            }
            let user = User {
                id: Uuid::new_v4(),
                email,
                created_at: Utc::now(),
            };
            state.accounts.insert(
                user.id,
                Account {
                    user: user.clone(),
                    password_hash: hash_password(password),
                },
            );
            self.persist_accounts(&state).await?;
            user
        };

        insert_profile(self.profiles.as_ref(), &user, full_name).await?;
        info!(user_id = %user.id, "account registered");
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email)?;
        let mut state = self.state.write().await;

        let user = state
            .accounts
            .values()
            .find(|account| account.user.email == email)
            .filter(|account| verify_password(&account.password_hash, password))
            .map(|account| account.user.clone())
            .ok_or_else(|| Error::Remote("Invalid login credentials".to_string()))?;

        let (access_token, expires_at) = self.issue_token(&user)?;
        let session = Session {
            access_token,
            user,
            expires_at,
        };
        state.session = Some(session.clone());
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.state.write().await.session = None;
        Ok(())
    }

    async fn profile(&self) -> Result<Option<Profile>> {
        let user = self.require_user().await?;
        fetch_profile(self.profiles.as_ref(), user.id).await
    }

    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile> {
        let user = self.require_user().await?;
        patch_profile(self.profiles.as_ref(), user.id, patch).await
    }
}

fn hash_password(password: &str) -> String {
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    format!(
        "v1${}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    let mut parts = stored_hash.split('$');
    let (Some("v1"), Some(encoded_salt), Some(encoded_digest)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(expected_digest)) = (
        URL_SAFE_NO_PAD.decode(encoded_salt),
        URL_SAFE_NO_PAD.decode(encoded_digest),
    ) else {
        return false;
    };

    let mut hasher = Sha256::new();
    hasher.update(&salt);
    hasher.update(password.as_bytes());
    expected_digest == hasher.finalize().as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;

    fn build_auth() -> MemoryAuth {
        MemoryAuth::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn sign_up_and_sign_in_roundtrip() {
        let auth = build_auth();
        auth.sign_up("Owner@Example.com", "secret-pw", Some("Owner".to_string()))
            .await
            .unwrap();

        assert!(auth.current_user().await.is_none());

        let session = auth.sign_in("owner@example.com", "secret-pw").await.unwrap();
        assert_eq!(session.user.email, "owner@example.com");
        assert_eq!(auth.current_user().await.unwrap().id, session.user.id);

        let profile = auth.profile().await.unwrap().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Owner"));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = build_auth();
        auth.sign_up("owner@example.com", "secret-pw", None)
            .await
            .unwrap();

        let result = auth.sign_in("owner@example.com", "nope-nope").await;
        assert!(matches!(result, Err(Error::Remote(_))));
        assert!(auth.session().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_and_invalid_sign_ups() {
        let auth = build_auth();
        auth.sign_up("owner@example.com", "secret-pw", None)
            .await
            .unwrap();

        assert!(matches!(
            auth.sign_up("owner@example.com", "secret-pw", None).await,
            Err(Error::Remote(_))
        ));
        assert!(matches!(
            auth.sign_up("not-an-email", "secret-pw", None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            auth.sign_up("other@example.com", "short", None).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn expired_session_reads_as_signed_out() {
        let auth = build_auth().with_session_ttl(-3600);
        auth.sign_up("owner@example.com", "secret-pw", None)
            .await
            .unwrap();
        auth.sign_in("owner@example.com", "secret-pw").await.unwrap();

        assert!(auth.session().await.is_none());
        assert!(matches!(auth.profile().await, Err(Error::NotAuthenticated)));
    }

    #[tokio::test]
    async fn sign_out_and_update_profile() {
        let auth = build_auth();
        auth.sign_up("owner@example.com", "secret-pw", None)
            .await
            .unwrap();
        auth.sign_in("owner@example.com", "secret-pw").await.unwrap();

        let profile = auth
            .update_profile(&ProfilePatch {
                full_name: Some(Some("Renamed".to_string())),
                ..ProfilePatch::default()
            })
            .await
            .unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Renamed"));

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().await.is_none());
        assert!(matches!(
            auth.update_profile(&ProfilePatch::default()).await,
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn accounts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let profiles: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());

        let auth = MemoryAuth::open(profiles.clone(), &path).await.unwrap();
        auth.sign_up("owner@example.com", "secret-pw", None)
            .await
            .unwrap();

        let reopened = MemoryAuth::open(profiles, &path).await.unwrap();
        assert!(reopened.session().await.is_none());
        let session = reopened
            .sign_in("owner@example.com", "secret-pw")
            .await
            .unwrap();
        assert_eq!(session.user.email, "owner@example.com");
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("secret-pw");
        assert!(verify_password(&hash, "secret-pw"));
        assert!(!verify_password(&hash, "secret-px"));
        assert!(!verify_password("garbage", "secret-pw"));
    }
}
