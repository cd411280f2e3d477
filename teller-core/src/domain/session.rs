//! Authentication session types shared by identity providers

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::Identity;

/// User record as returned by an identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    /// Provider-side user metadata (`{"full_name": ...}`)
    #[serde(default)]
    pub metadata: JsonValue,
}

/// An authenticated session issued by an identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

/// Change notification emitted by the session store
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Identity),
    SignedOut,
}

impl SessionEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionEvent::SignedIn(identity) => Some(identity),
            SessionEvent::SignedOut => None,
        }
    }
}
