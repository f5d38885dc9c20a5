// Authentication provider trait - the session controller's view of identity
use crate::domain::session::AuthNotification;
use async_trait::async_trait;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// Deliberately the same for unknown accounts and wrong passwords
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("No active session")]
    NotSignedIn,
    #[error("authentication provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Presence/absence notifications, in the order they happen
    fn subscribe(&self) -> broadcast::Receiver<AuthNotification>;

    /// Ends the current session. Success is reported through an
    /// `Unauthenticated` notification, not through the return value.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Ask the provider to email a password reset link.
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;
}

/// Byte comparison whose running time depends only on the lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
