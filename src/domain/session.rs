// Session lifecycle vocabulary
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    LoggedOut,
    Active,
}

/// User interactions that count as activity for the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerMove,
    PointerDown,
    KeyPress,
    Scroll,
    Touch,
}

/// Why the last sign-out was requested. Informational only; every trigger
/// goes through the same sign-out path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutReason {
    Idle,
    Absolute,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthNotification {
    /// `token` is the bearer credential issued to the client that signed in.
    Authenticated { user: String, token: String },
    Unauthenticated,
}
