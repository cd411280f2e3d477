//! Teller Core - ledger logic for a small banking client
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, Identity)
//! - **ports**: Trait definitions for external dependencies (IdentityProvider, DataStore)
//! - **services**: Session and ledger stores, event logging, migrations
//! - **adapters**: Concrete implementations (DuckDB, hosted HTTP backend)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod log_migrations;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbBackend;
use adapters::hosted::HostedBackend;
use adapters::session_file::SessionSlot;
use config::{BackendKind, Config};
use ports::{DataStore, IdentityProvider};
use services::{LedgerStore, SessionStore};

// Re-export commonly used types at crate root
pub use domain::{
    Account, AccountKind, AuthSession, AuthUser, Identity, Profile, SessionEvent, Transaction,
    TransactionKind,
};
pub use domain::result::{Error, OperationResult};
pub use services::{EntryPoint, LogEntry, LogEvent, LoggingService};

/// Local database file inside the teller directory
pub const DB_FILE: &str = "teller.duckdb";

/// Persisted session inside the teller directory
pub const SESSION_FILE: &str = "session.json";

/// Main context for Teller operations
///
/// Owns the session store and the ledger store and wires them to the
/// configured backend. The ledger follows the session: signing in loads
/// the identity's accounts, signing out clears them.
pub struct TellerContext {
    pub config: Config,
    pub session: Arc<SessionStore>,
    pub ledger: Arc<LedgerStore>,
    teller_dir: PathBuf,
}

impl TellerContext {
    /// Create a context for the backend configured in `teller_dir`
    pub fn new(teller_dir: &Path) -> Result<Self> {
        let config = Config::load(teller_dir)?;
        Self::with_config(teller_dir, config)
    }

    pub fn with_config(teller_dir: &Path, config: Config) -> Result<Self> {
        std::fs::create_dir_all(teller_dir)?;
        let slot = SessionSlot::file(teller_dir.join(SESSION_FILE));

        let (identity, data): (Arc<dyn IdentityProvider>, Arc<dyn DataStore>) = match config.backend
        {
            BackendKind::Local => {
                let backend = Arc::new(DuckDbBackend::open(&teller_dir.join(DB_FILE), slot)?);
                (backend.clone(), backend)
            }
            BackendKind::Hosted => {
                let (url, api_key) = config.hosted_credentials()?;
                let backend = Arc::new(HostedBackend::new(url, api_key, slot)?);
                (backend.clone(), backend)
            }
        };

        Ok(Self::from_ports(teller_dir, config, identity, data))
    }

    /// Assemble a context over arbitrary port implementations
    pub fn from_ports(
        teller_dir: &Path,
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        data: Arc<dyn DataStore>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(identity, Arc::clone(&data)));
        let ledger = Arc::new(LedgerStore::new(data));
        session.subscribe(ledger.clone());

        Self {
            config,
            session,
            ledger,
            teller_dir: teller_dir.to_path_buf(),
        }
    }

    /// Restore the persisted session and re-apply the remembered selection
    pub fn restore(&self) -> domain::result::Result<Option<Identity>> {
        let identity = self.session.restore()?;
        if identity.is_some() {
            if let Some(message) = self.ledger.take_load_error() {
                return Err(Error::Persistence(message));
            }
            if let Some(account_id) = self.config.selected_account {
                self.ledger.select_account(account_id)?;
            }
        }
        Ok(identity)
    }

    /// Remember the currently selected account for the next invocation
    pub fn remember_selection(&mut self) -> Result<()> {
        self.config.selected_account = self.ledger.selected_account().map(|a| a.id);
        self.config.save(&self.teller_dir)
    }

    /// Name of the active backend ("local" or "hosted")
    pub fn backend_name(&self) -> &str {
        self.session.provider_name()
    }

    pub fn teller_dir(&self) -> &Path {
        &self.teller_dir
    }
}
