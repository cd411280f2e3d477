//! Identity provider port - authentication service abstraction

use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::AuthSession;

/// Identity provider trait
///
/// Implementations authenticate users against an identity service and
/// persist the resulting session so it can be restored later. Every method
/// is a blocking call to the service and fails with `Error::Auth` when the
/// service rejects the request or cannot be reached.
pub trait IdentityProvider: Send + Sync {
    /// Provider name (e.g., "local", "hosted")
    fn name(&self) -> &str;

    /// Return the persisted session, if one is still valid
    fn get_session(&self) -> Result<Option<AuthSession>>;

    /// Register a new user and start a session
    ///
    /// # Arguments
    /// * `metadata` - Provider-side user metadata (e.g., `{"full_name": ...}`)
    fn sign_up(&self, email: &str, password: &str, metadata: &JsonValue) -> Result<AuthSession>;

    /// Start a session with e-mail and password
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// End the current session
    ///
    /// Implementations drop the persisted session even when the remote call
    /// fails.
    fn sign_out(&self) -> Result<()>;
}
