//! Route gating on session state.
//!
//! Views that need a signed-in user (cart, checkout, orders, profile) or an
//! admin (dashboard and management pages) ask a [`RouteGuard`] before
//! rendering. The guard waits for the session to settle so a persisted token
//! is never mistaken for a signed-in user, or its absence for a signed-out one.

use crate::services::SessionManager;

/// Path to send anonymous users to.
pub const LOGIN_PATH: &str = "/login";

/// Path to send users who lack the required role to.
pub const HOME_PATH: &str = "/";

/// Access requirement of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGuard {
    /// Anyone may view.
    Public,
    /// Requires a signed-in user.
    Authenticated,
    /// Requires a signed-in admin.
    Admin,
}

/// Decision for a route visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Render the route.
    Allow,
    /// Session still resolving; render a loading state.
    Pending,
    /// Anonymous visitor on a protected route.
    RedirectToLogin,
    /// Signed-in user without the admin role on an admin route.
    RedirectHome,
}

impl RouteGuard {
    /// Decide whether the current session may view the route.
    #[must_use]
    pub fn check(self, session: &SessionManager) -> GuardOutcome {
        if self == Self::Public {
            return GuardOutcome::Allow;
        }
        if !session.is_settled() {
            return GuardOutcome::Pending;
        }
        if !session.is_authenticated() {
            return GuardOutcome::RedirectToLogin;
        }

        match self {
            Self::Admin if !session.is_admin() => GuardOutcome::RedirectHome,
            _ => GuardOutcome::Allow,
        }
    }
}

impl GuardOutcome {
    /// Where to navigate instead of rendering, if anywhere.
    #[must_use]
    pub const fn redirect_path(self) -> Option<&'static str> {
        match self {
            Self::RedirectToLogin => Some(LOGIN_PATH),
            Self::RedirectHome => Some(HOME_PATH),
            Self::Allow | Self::Pending => None,
        }
    }
}
