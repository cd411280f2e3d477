//! Session service - authenticated identity and change notification

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::json;

use crate::domain::result::{Error, Result};
use crate::domain::{AuthSession, Identity, Profile, SessionEvent};
use crate::ports::{DataStore, IdentityProvider, Table};

/// Receives session changes
///
/// Listeners are called synchronously, in subscription order, before the
/// call that changed the session returns.
pub trait SessionListener: Send + Sync {
    fn on_session_change(&self, event: &SessionEvent);
}

/// Handle returned by [`SessionStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Holds the current identity and drives sign-up, sign-in and sign-out
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    data: Arc<dyn DataStore>,
    current: RwLock<Option<Identity>>,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn SessionListener>)>>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn IdentityProvider>, data: Arc<dyn DataStore>) -> Self {
        Self {
            provider,
            data,
            current: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Name of the identity provider backing this store
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, listener));
        }
        id
    }

    /// Remove a listener. Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(sid, _)| *sid != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    /// Current identity, if authenticated
    pub fn current(&self) -> Option<Identity> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Restore a session persisted by the identity provider
    pub fn restore(&self) -> Result<Option<Identity>> {
        match self.provider.get_session()? {
            Some(session) => Ok(Some(self.authenticate(&session))),
            None => {
                if self.is_authenticated() {
                    self.set_identity(None);
                }
                Ok(None)
            }
        }
    }

    /// Register a new identity and its profile record
    ///
    /// The session is authenticated as soon as the identity service accepts
    /// the registration. A failed profile write is reported as
    /// `Error::Persistence` but does not undo the sign-up.
    pub fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Identity> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::auth("email is required"));
        }

        let metadata = json!({ "full_name": display_name });
        let session = self.provider.sign_up(email, password, &metadata)?;
        let identity = self.authenticate(&session);

        let profile = Profile::for_identity(&identity);
        self.data.insert(Table::Users, profile.to_row())?;

        Ok(identity)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let session = self.provider.sign_in_with_password(email.trim(), password)?;
        Ok(self.authenticate(&session))
    }

    /// Sign out. Local state is cleared even if the remote call fails.
    pub fn sign_out(&self) -> Result<()> {
        let remote = self.provider.sign_out();
        self.set_identity(None);
        remote
    }

    fn authenticate(&self, session: &AuthSession) -> Identity {
        let identity = Identity::from_auth_user(&session.user);
        self.set_identity(Some(identity.clone()));
        identity
    }

    fn set_identity(&self, identity: Option<Identity>) {
        if let Ok(mut current) = self.current.write() {
            *current = identity.clone();
        }

        let event = match identity {
            Some(identity) => SessionEvent::SignedIn(identity),
            None => SessionEvent::SignedOut,
        };

        // Snapshot so listeners can subscribe or unsubscribe while notified
        let listeners: Vec<Arc<dyn SessionListener>> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => Vec::new(),
        };
        for listener in listeners {
            listener.on_session_change(&event);
        }
    }
}
