//! Identity and profile domain models

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::session::AuthUser;
use super::Row;

/// The authenticated user of the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}

impl Identity {
    pub fn new(id: Uuid, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    /// Display name comes from the `full_name` metadata set at sign-up
    pub fn from_auth_user(user: &AuthUser) -> Self {
        let display_name = user
            .metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Self::new(user.id, display_name, user.email.clone())
    }
}

/// Row in the `users` profile table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
}

impl Profile {
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.email.clone(),
            full_name: identity.display_name.clone(),
        }
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), JsonValue::String(self.id.to_string()));
        row.insert("username".to_string(), JsonValue::String(self.username.clone()));
        row.insert("full_name".to_string(), JsonValue::String(self.full_name.clone()));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_auth_user() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            metadata: serde_json::json!({"full_name": "Ada Lovelace"}),
        };
        let identity = Identity::from_auth_user(&user);
        assert_eq!(identity.display_name, "Ada Lovelace");
        assert_eq!(identity.email, "ada@example.com");
    }

    #[test]
    fn test_missing_full_name() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            metadata: JsonValue::Null,
        };
        assert_eq!(Identity::from_auth_user(&user).display_name, "");
    }

    #[test]
    fn test_profile_uses_email_as_username() {
        let identity = Identity::new(Uuid::new_v4(), "Ada", "ada@example.com");
        let row = Profile::for_identity(&identity).to_row();
        assert_eq!(row["username"], "ada@example.com");
        assert_eq!(row["full_name"], "Ada");
    }
}
