//! Resolved user identity.

use serde::{Deserialize, Serialize};

use super::{Role, UserId};

/// The user record resolved from a credential token.
///
/// Distinct from the token itself: a token may exist on disk while no
/// identity has been resolved yet (or after resolution failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Remote user id.
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Login email address.
    pub email: String,
    /// Authorization role.
    #[serde(default)]
    pub role: Role,
    /// Optional contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Identity {
    /// Whether this identity may access admin routes.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Partial identity sent to the profile update endpoint.
///
/// Fields left as `None` are not serialized and stay unchanged remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    /// Returns `true` when no field would be changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }

    /// Apply this update to a local identity copy.
    pub fn apply_to(&self, identity: &mut Identity) {
        if let Some(name) = &self.name {
            identity.name.clone_from(name);
        }
        if let Some(email) = &self.email {
            identity.email.clone_from(email);
        }
        if let Some(phone) = &self.phone {
            identity.phone = Some(phone.clone());
        }
    }
}
