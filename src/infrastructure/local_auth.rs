// In-process authentication provider backed by configured users
use crate::application::auth_provider::{AuthError, AuthProvider, constant_time_eq};
use crate::domain::session::AuthNotification;
use crate::infrastructure::config::UserCredential;
use anyhow::{Context, bail};
use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::broadcast;

struct StoredCredential {
    salt: String,
    digest: [u8; 32],
}

pub struct LocalAuthProvider {
    users: HashMap<String, StoredCredential>,
    tx: broadcast::Sender<AuthNotification>,
}

fn salted_digest(salt: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Hex digest in the form stored in `password_sha256`.
pub fn password_digest(salt: &str, password: &str) -> String {
    hex::encode(salted_digest(salt, password))
}

fn issue_token() -> String {
    hex::encode(rand::thread_rng().r#gen::<[u8; 32]>())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl LocalAuthProvider {
    /// Fails on entries that could never be signed into: empty salt or a
    /// digest that is not 32 hex-encoded bytes.
    pub fn new(users: Vec<UserCredential>) -> anyhow::Result<Self> {
        let mut stored = HashMap::new();
        for user in users {
            let email = normalize_email(&user.email);
            if user.salt.trim().is_empty() {
                bail!("User {} has no password salt", email);
            }
            let digest: [u8; 32] = hex::decode(user.password_sha256.trim())
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .with_context(|| format!("User {} has a malformed password digest", email))?;
            stored.insert(
                email,
                StoredCredential {
                    salt: user.salt,
                    digest,
                },
            );
        }
        if stored.is_empty() {
            tracing::warn!("No users configured; sign-in is disabled");
        }

        let (tx, _) = broadcast::channel(32);
        Ok(Self { users: stored, tx })
    }

    /// Returns the session token the client presents on later requests.
    /// Unknown account and wrong password fail identically.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        let matched = self
            .users
            .get(&email)
            .is_some_and(|u| constant_time_eq(&salted_digest(&u.salt, password), &u.digest));
        if !matched {
            tracing::info!("Rejected sign-in attempt");
            return Err(AuthError::InvalidCredentials);
        }

        let token = issue_token();
        let _ = self.tx.send(AuthNotification::Authenticated {
            user: email,
            token: token.clone(),
        });
        Ok(token)
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    fn subscribe(&self) -> broadcast::Receiver<AuthNotification> {
        self.tx.subscribe()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // No receivers is fine; nobody is watching the session yet
        let _ = self.tx.send(AuthNotification::Unauthenticated);
        Ok(())
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), AuthError> {
        Err(AuthError::Unavailable(
            "password reset is not supported for locally configured users".to_string(),
        ))
    }
}
