// Session lifecycle controller - idle and absolute expiry driven by auth notifications
use crate::application::auth_provider::{AuthError, AuthProvider, constant_time_eq};
use crate::domain::session::{ActivityKind, AuthNotification, SessionState, SignOutReason};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub idle_timeout: Duration,
    pub absolute_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            absolute_timeout: Duration::from_secs(8 * 60 * 60),
        }
    }
}

struct ScheduledTimer {
    deadline: Instant,
    handle: JoinHandle<()>,
}

impl ScheduledTimer {
    fn cancel(self) {
        self.handle.abort();
    }
}

struct ActiveSession {
    user: String,
    token: String,
}

#[derive(Default)]
struct Timers {
    idle: Option<ScheduledTimer>,
    absolute: Option<ScheduledTimer>,
    session: Option<ActiveSession>,
    last_reason: Option<SignOutReason>,
}

impl Timers {
    fn holds(&self, token: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| constant_time_eq(s.token.as_bytes(), token.as_bytes()))
    }
}

/// Owns the idle and absolute timers. State only changes in response to
/// provider notifications; timers and the user merely ask the provider to
/// sign out. Only the holder of the current session token may act on it.
pub struct SessionController {
    auth: Arc<dyn AuthProvider>,
    policy: SessionPolicy,
    timers: Mutex<Timers>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionController {
    pub fn new(auth: Arc<dyn AuthProvider>, policy: SessionPolicy) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::LoggedOut);
        Arc::new(Self {
            auth,
            policy,
            timers: Mutex::new(Timers::default()),
            state_tx,
        })
    }

    /// Subscribe to the provider and process its notifications in the
    /// background until the provider goes away.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut notifications = self.auth.subscribe();
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => match controller.upgrade() {
                        Some(c) => c.handle_notification(notification),
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} auth notifications", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth notification stream closed");
        })
    }

    pub fn handle_notification(self: &Arc<Self>, notification: AuthNotification) {
        let mut timers = self.lock_timers();
        match notification {
            AuthNotification::Authenticated { user, token } => {
                tracing::info!("User {} signed in, starting session timers", user);
                timers.session = Some(ActiveSession { user, token });
                timers.last_reason = None;

                if let Some(idle) = timers.idle.take() {
                    idle.cancel();
                }
                timers.idle = Some(self.schedule(SignOutReason::Idle, self.policy.idle_timeout));

                if timers.absolute.is_none() {
                    timers.absolute = Some(
                        self.schedule(SignOutReason::Absolute, self.policy.absolute_timeout),
                    );
                }
                self.state_tx.send_replace(SessionState::Active);
            }
            AuthNotification::Unauthenticated => {
                tracing::info!("Signed out, stopping all session timers");
                if let Some(idle) = timers.idle.take() {
                    idle.cancel();
                }
                if let Some(absolute) = timers.absolute.take() {
                    absolute.cancel();
                }
                timers.session = None;
                self.state_tx.send_replace(SessionState::LoggedOut);
            }
        }
    }

    /// True when `token` belongs to the active session.
    pub fn authorize(&self, token: &str) -> bool {
        self.lock_timers().holds(token)
    }

    /// Wait until the session for `token` is active. `states` must be
    /// subscribed before the sign-in that issued the token.
    pub async fn session_established(
        &self,
        mut states: watch::Receiver<SessionState>,
        token: &str,
        within: Duration,
    ) -> bool {
        let established = async {
            while !self.authorize(token) {
                if states.changed().await.is_err() {
                    return false;
                }
            }
            true
        };
        tokio::time::timeout(within, established)
            .await
            .unwrap_or(false)
    }

    /// Restart the idle countdown. Ignored unless `token` holds the active
    /// session.
    pub fn record_activity(self: &Arc<Self>, token: &str, kind: ActivityKind) -> bool {
        let mut timers = self.lock_timers();
        if !timers.holds(token) {
            return false;
        }
        tracing::trace!("Activity {:?}, resetting idle timer", kind);
        if let Some(idle) = timers.idle.take() {
            idle.cancel();
        }
        timers.idle = Some(self.schedule(SignOutReason::Idle, self.policy.idle_timeout));
        true
    }

    /// User-initiated sign-out; same path as a timeout.
    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        if !self.authorize(token) {
            return Err(AuthError::NotSignedIn);
        }
        self.request_sign_out(SignOutReason::User).await
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn current_user(&self) -> Option<String> {
        self.lock_timers().session.as_ref().map(|s| s.user.clone())
    }

    pub fn last_sign_out_reason(&self) -> Option<SignOutReason> {
        self.lock_timers().last_reason
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.lock_timers().idle.as_ref().map(|t| t.deadline)
    }

    pub fn absolute_deadline(&self) -> Option<Instant> {
        self.lock_timers().absolute.as_ref().map(|t| t.deadline)
    }

    async fn request_sign_out(&self, reason: SignOutReason) -> Result<(), AuthError> {
        self.lock_timers().last_reason = Some(reason);
        tracing::info!("Signing out ({:?})", reason);
        self.auth.sign_out().await.inspect_err(|e| {
            tracing::error!("Sign-out request failed: {}", e);
        })
    }

    fn schedule(self: &Arc<Self>, reason: SignOutReason, after: Duration) -> ScheduledTimer {
        let deadline = Instant::now() + after;
        let controller: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(c) = controller.upgrade() {
                let _ = c.request_sign_out(reason).await;
            }
        });
        ScheduledTimer { deadline, handle }
    }

    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
