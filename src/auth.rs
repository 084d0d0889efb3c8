use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::{AuthError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Staff => f.write_str("staff"),
        }
    }
}

/// Authenticated identity context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub role: Role,
}

/// Provider-specific failure codes, before mapping to user-facing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    UserNotFound,
    WrongPassword,
    InvalidEmail,
    TooManyRequests,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub uid: String,
    pub email: String,
}

/// Identity provider boundary: credential in, opaque identity out.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderIdentity, ProviderFailure>;

    async fn sign_out(&self) -> std::result::Result<(), ProviderFailure>;
}

type Listener = Box<dyn Fn(Option<&Session>) + Send + Sync>;

/// Wraps the identity provider: maps its failure codes to the fixed
/// AuthError set and notifies listeners on sign-in state transitions.
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    session: Mutex<Option<Session>>,
    listeners: Arc<Mutex<HashMap<u64, Listener>>>,
    next_listener: AtomicU64,
}

impl AuthGateway {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            session: Mutex::new(None),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let identity = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(map_failure)?;

        // Every account gets the same role. A per-account role lookup from
        // a profile record is not implemented.
        let session = Session {
            uid: identity.uid,
            email: identity.email,
            role: Role::Admin,
        };
        info!(email = %session.email, "signed in");
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        self.provider
            .sign_out()
            .await
            .map_err(|_| AuthError::Other("sign-out failed".to_string()))?;
        info!("signed out");
        self.set_session(None);
        Ok(())
    }

    pub fn session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    /// Externally-driven session expiry, e.g. a revoked credential.
    pub fn expire(&self) {
        self.set_session(None);
    }

    /// Register a listener for sign-in state transitions. Fires exactly
    /// once per anonymous/authenticated transition, never on an unchanged
    /// state. Dropping the returned handle deregisters the listener.
    pub fn on_session_change(
        &self,
        callback: impl Fn(Option<&Session>) + Send + Sync + 'static,
    ) -> SessionSubscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap()
            .insert(id, Box::new(callback));
        SessionSubscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    fn set_session(&self, next: Option<Session>) {
        let snapshot = {
            let mut current = self.session.lock().unwrap();
            let changed = current.is_some() != next.is_some();
            *current = next;
            if !changed {
                return;
            }
            current.clone()
        };
        for listener in self.listeners.lock().unwrap().values() {
            listener(snapshot.as_ref());
        }
    }
}

/// Deregistration handle for a session-change listener.
pub struct SessionSubscription {
    id: u64,
    listeners: Arc<Mutex<HashMap<u64, Listener>>>,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.listeners.lock().unwrap().remove(&self.id);
    }
}

fn map_failure(failure: ProviderFailure) -> AuthError {
    match failure {
        ProviderFailure::UserNotFound => AuthError::UnknownAccount,
        ProviderFailure::WrongPassword => AuthError::WrongCredential,
        ProviderFailure::InvalidEmail => AuthError::MalformedEmail,
        ProviderFailure::TooManyRequests => AuthError::RateLimited,
        ProviderFailure::Other(message) => AuthError::Other(message),
    }
}

const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Development provider seeded from the environment, so the CLI can
/// exercise the gateway without a hosted identity service.
pub struct EnvIdentityProvider {
    email: String,
    password: String,
    uid: String,
    failed_attempts: AtomicU32,
}

impl EnvIdentityProvider {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            uid: Uuid::new_v4().to_string(),
            failed_attempts: AtomicU32::new(0),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let email = std::env::var("TRACKER_LOGIN_EMAIL")
            .context("TRACKER_LOGIN_EMAIL must be set for the dev identity provider")?;
        let password = std::env::var("TRACKER_LOGIN_PASSWORD")
            .context("TRACKER_LOGIN_PASSWORD must be set for the dev identity provider")?;
        Ok(Self::new(email, password))
    }
}

#[async_trait]
impl IdentityProvider for EnvIdentityProvider {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderIdentity, ProviderFailure> {
        if !email.contains('@') {
            return Err(ProviderFailure::InvalidEmail);
        }
        if self.failed_attempts.load(Ordering::Relaxed) >= MAX_FAILED_ATTEMPTS {
            return Err(ProviderFailure::TooManyRequests);
        }
        if email != self.email {
            self.failed_attempts.fetch_add(1, Ordering::Relaxed);
            return Err(ProviderFailure::UserNotFound);
        }
        if password != self.password {
            self.failed_attempts.fetch_add(1, Ordering::Relaxed);
            return Err(ProviderFailure::WrongPassword);
        }

        self.failed_attempts.store(0, Ordering::Relaxed);
        Ok(ProviderIdentity {
            uid: self.uid.clone(),
            email: self.email.clone(),
        })
    }

    async fn sign_out(&self) -> std::result::Result<(), ProviderFailure> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn gateway() -> AuthGateway {
        AuthGateway::new(Arc::new(EnvIdentityProvider::new(
            "admin@campus.example",
            "hunter2",
        )))
    }

    #[tokio::test]
    async fn login_produces_admin_session() {
        let gateway = gateway();
        let session = gateway.login("admin@campus.example", "hunter2").await.unwrap();
        assert_eq!(session.email, "admin@campus.example");
        assert_eq!(session.role, Role::Admin);
        assert_eq!(gateway.session(), Some(session));
    }

    #[tokio::test]
    async fn provider_failures_map_to_fixed_messages() {
        let gateway = gateway();

        let err = gateway.login("nobody@campus.example", "hunter2").await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UnknownAccount)));

        let err = gateway.login("admin@campus.example", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::WrongCredential)));

        let err = gateway.login("not-an-email", "hunter2").await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::MalformedEmail)));
    }

    #[tokio::test]
    async fn repeated_failures_rate_limit() {
        let gateway = gateway();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = gateway.login("admin@campus.example", "wrong").await;
        }
        let err = gateway.login("admin@campus.example", "hunter2").await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::RateLimited)));
    }

    #[tokio::test]
    async fn listener_fires_once_per_transition() {
        let gateway = gateway();
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = gateway.on_session_change(move |session| {
            sink.lock().unwrap().push(session.map(|s| s.email.clone()));
        });

        gateway.login("admin@campus.example", "hunter2").await.unwrap();
        // Already authenticated: no state transition, no callback.
        gateway.login("admin@campus.example", "hunter2").await.unwrap();
        gateway.logout().await.unwrap();
        // Already anonymous: expiry is a no-op.
        gateway.expire();

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![Some("admin@campus.example".to_string()), None]
        );
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn unsubscribed_listener_stops_receiving() {
        let gateway = gateway();
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = gateway.on_session_change(move |session| {
            sink.lock().unwrap().push(session.map(|s| s.email.clone()));
        });

        gateway.login("admin@campus.example", "hunter2").await.unwrap();
        subscription.unsubscribe();
        gateway.logout().await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn external_expiry_notifies_listeners() {
        let gateway = gateway();
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = gateway.on_session_change(move |session| {
            sink.lock().unwrap().push(session.map(|s| s.email.clone()));
        });

        gateway.login("admin@campus.example", "hunter2").await.unwrap();
        gateway.expire();

        let events = seen.lock().unwrap().clone();
        assert_eq!(events.last(), Some(&None));
        assert!(gateway.session().is_none());
    }
}
