//! Session manager.
//!
//! Resolves, holds and invalidates the signed-in identity. The persisted
//! token is the source of truth across restarts; the in-memory identity is
//! only ever set from an auth service response.
//!
//! Other components follow identity changes by registering a
//! [`SessionListener`]. The cart engine is the main one: it fetches the cart
//! when a user signs in and drops it when they sign out.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use shopfront_core::{Identity, ProfileUpdate, UserId};

use crate::api::ApiError;
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::token::TokenStore;

/// Minimum length for a new password.
pub const MIN_PASSWORD_LENGTH: usize = 6;

const LOGIN_FAILED: &str = "Invalid credentials. Please try again.";
const REGISTER_FAILED: &str = "Registration failed. Please try again.";
const PROFILE_UPDATE_FAILED: &str = "Failed to update profile";
const PASSWORD_CHANGE_FAILED: &str = "Failed to change password";

// =============================================================================
// Collaborator Contract
// =============================================================================

/// Email/password pair sent to the login endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// New account details sent to the registration endpoint.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

/// Current and replacement password sent to the change-password endpoint.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub current: SecretString,
    pub new: SecretString,
}

/// Token and identity returned by a successful login or registration.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: SecretString,
    pub identity: Identity,
}

/// The remote auth service.
///
/// Requests that need a bearer credential rely on the transport to attach
/// the persisted token.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an account and sign it in.
    async fn register(&self, registration: &Registration) -> Result<AuthGrant, ApiError>;

    /// Exchange credentials for a token.
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError>;

    /// Resolve the identity behind the current bearer token.
    async fn profile(&self) -> Result<Identity, ApiError>;

    /// Update profile fields. Returns the updated identity when the service sends one.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Option<Identity>, ApiError>;

    /// Replace the account password.
    async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError>;
}

/// Observer of identity transitions.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// A different user (or the first user) is now signed in.
    async fn signed_in(&self, identity: &Identity);

    /// The identity was dropped. Must not block.
    fn signed_out(&self);
}

// =============================================================================
// Session State
// =============================================================================

/// Observable session status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Startup resolution has not finished; render a loading state.
    Resolving,
    /// Settled with no identity.
    Anonymous,
    /// Settled with a resolved identity.
    Authenticated(Identity),
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Identity>,
    settled: bool,
    /// Bumped on every login, registration and logout so that a slow
    /// bootstrap cannot overwrite a newer decision.
    epoch: u64,
}

/// What listeners need to hear about after an identity change.
enum Transition {
    Unchanged,
    SignedIn(Identity),
    SignedOut,
}

impl SessionState {
    fn replace_identity(&mut self, identity: Option<Identity>) -> Transition {
        let previous: Option<UserId> = self.identity.as_ref().map(|i| i.id.clone());
        self.identity.clone_from(&identity);
        self.settled = true;
        self.epoch += 1;

        match (previous, identity) {
            (previous, Some(identity)) if previous.as_ref() != Some(&identity.id) => {
                Transition::SignedIn(identity)
            }
            (Some(_), None) => Transition::SignedOut,
            _ => Transition::Unchanged,
        }
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Owner of the authenticated identity.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    auth: Arc<dyn AuthApi>,
    tokens: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl SessionManager {
    /// Create an unsettled session.
    ///
    /// Call [`bootstrap`](Self::bootstrap) before relying on
    /// [`is_settled`](Self::is_settled).
    #[must_use]
    pub fn new(auth: Arc<dyn AuthApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                auth,
                tokens,
                state: RwLock::new(SessionState::default()),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register an observer of identity transitions.
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.inner.listeners.write().push(listener);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The resolved identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.read().identity.clone()
    }

    /// Whether startup resolution has finished.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.state.read().settled
    }

    /// Whether an identity is resolved.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.read().identity.is_some()
    }

    /// Whether the resolved identity is an admin. `false` while resolving.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner
            .state
            .read()
            .identity
            .as_ref()
            .is_some_and(Identity::is_admin)
    }

    /// Current status for rendering.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let state = self.inner.state.read();
        match (&state.identity, state.settled) {
            (Some(identity), _) => SessionStatus::Authenticated(identity.clone()),
            (None, false) => SessionStatus::Resolving,
            (None, true) => SessionStatus::Anonymous,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve the persisted token into an identity.
    ///
    /// Never fails and always leaves the session settled. A token that cannot
    /// be resolved (expired, revoked, network failure) is erased, because an
    /// identity that cannot be proven must not be treated as signed in.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> SessionStatus {
        let epoch = self.inner.state.read().epoch;

        let token = self.inner.tokens.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read persisted token");
            None
        });

        if token.is_none() {
            tracing::debug!("No persisted token, session is anonymous");
            self.settle();
            return self.status();
        }

        match self.inner.auth.profile().await {
            Ok(identity) => {
                let transition = {
                    let mut state = self.inner.state.write();
                    if state.epoch == epoch {
                        Some(state.replace_identity(Some(identity)))
                    } else {
                        None
                    }
                };
                match transition {
                    Some(transition) => {
                        tracing::info!("Session restored from persisted token");
                        self.notify(transition).await;
                    }
                    None => tracing::debug!("Session changed during bootstrap, discarding profile"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve session identity, signing out");
                let current = self.inner.state.read().epoch == epoch;
                if current {
                    self.logout();
                }
            }
        }

        self.settle();
        self.status()
    }

    /// Sign in with email (or handle) and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Invalid` for empty input, `AuthError::Rejected` if
    /// the auth service refuses, and `AuthError::TokenStore` if the token
    /// cannot be persisted. The session is unchanged on any error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: SecretString) -> Result<Identity, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.expose_secret().is_empty() {
            return Err(AuthError::Invalid(
                "Email and password are required".to_string(),
            ));
        }

        let credentials = Credentials {
            email: email.to_owned(),
            password,
        };
        let grant = self
            .inner
            .auth
            .login(&credentials)
            .await
            .map_err(|e| AuthError::rejected(e, LOGIN_FAILED))?;

        self.establish(grant).await
    }

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    #[instrument(skip(self, name, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: SecretString,
    ) -> Result<Identity, AuthError> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() || password.expose_secret().is_empty() {
            return Err(AuthError::Invalid(
                "Name, email and password are required".to_string(),
            ));
        }

        let registration = Registration {
            name: name.to_owned(),
            email: email.to_owned(),
            password,
        };
        let grant = self
            .inner
            .auth
            .register(&registration)
            .await
            .map_err(|e| AuthError::rejected(e, REGISTER_FAILED))?;

        self.establish(grant).await
    }

    /// Sign out. Clears the persisted token and the identity; never fails.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        if let Err(e) = self.inner.tokens.clear() {
            tracing::warn!(error = %e, "Failed to erase persisted token");
        }

        let transition = self.inner.state.write().replace_identity(None);
        if matches!(transition, Transition::SignedOut) {
            tracing::info!("Signed out");
            self.notify_signed_out();
        }
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Update profile fields of the signed-in user.
    ///
    /// The local identity is refreshed from the service response, or from a
    /// profile re-fetch when the service does not echo the record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` without a session and
    /// `AuthError::Rejected` if the service refuses.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity, AuthError> {
        let (current, epoch) = {
            let state = self.inner.state.read();
            (state.identity.clone(), state.epoch)
        };
        let current = current.ok_or(AuthError::NotAuthenticated)?;
        if update.is_empty() {
            return Ok(current);
        }

        let echoed = self
            .inner
            .auth
            .update_profile(&update)
            .await
            .map_err(|e| AuthError::rejected(e, PROFILE_UPDATE_FAILED))?;

        let refreshed = match echoed {
            Some(identity) => identity,
            None => match self.inner.auth.profile().await {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(error = %e, "Profile re-fetch failed, applying update locally");
                    let mut identity = current;
                    update.apply_to(&mut identity);
                    identity
                }
            },
        };

        {
            let mut state = self.inner.state.write();
            let same_user = state.identity.as_ref().is_some_and(|i| i.id == refreshed.id);
            if state.epoch == epoch && same_user {
                state.identity = Some(refreshed.clone());
            }
        }

        tracing::info!(user_id = %refreshed.id, "Profile updated");
        Ok(refreshed)
    }

    /// Change the password of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Invalid` if the confirmation does not match or the
    /// new password is shorter than [`MIN_PASSWORD_LENGTH`];
    /// `AuthError::NotAuthenticated` without a session; `AuthError::Rejected`
    /// if the service refuses (e.g. wrong current password).
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current: SecretString,
        new: SecretString,
        confirm: &SecretString,
    ) -> Result<(), AuthError> {
        validate_new_password(&new, confirm)?;
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }

        self.inner
            .auth
            .change_password(&PasswordChange { current, new })
            .await
            .map_err(|e| AuthError::rejected(e, PASSWORD_CHANGE_FAILED))?;

        tracing::info!("Password changed");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Persist a granted token, then publish the identity.
    async fn establish(&self, grant: AuthGrant) -> Result<Identity, AuthError> {
        // Token first: a failed write must leave the session untouched.
        self.inner.tokens.save(&grant.token)?;

        let identity = grant.identity;
        let transition = self.inner.state.write().replace_identity(Some(identity.clone()));
        tracing::info!(user_id = %identity.id, role = %identity.role, "Signed in");

        self.notify(transition).await;
        Ok(identity)
    }

    fn settle(&self) {
        self.inner.state.write().settled = true;
    }

    fn listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        self.inner.listeners.read().clone()
    }

    async fn notify(&self, transition: Transition) {
        match transition {
            Transition::SignedIn(identity) => {
                set_sentry_user(&identity.id, Some(identity.email.as_str()));
                for listener in self.listeners() {
                    listener.signed_in(&identity).await;
                }
            }
            Transition::SignedOut => self.notify_signed_out(),
            Transition::Unchanged => {}
        }
    }

    fn notify_signed_out(&self) {
        clear_sentry_user();
        for listener in self.listeners() {
            listener.signed_out();
        }
    }
}

/// Client-side checks for a new password.
fn validate_new_password(new: &SecretString, confirm: &SecretString) -> Result<(), AuthError> {
    let new = new.expose_secret();
    if new != confirm.expose_secret() {
        return Err(AuthError::Invalid("Passwords do not match".to_string()));
    }
    if new.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Invalid(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
