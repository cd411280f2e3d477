//! Session persistence for identity adapters
//!
//! A session outlives a single CLI invocation by being written to
//! `session.json` in the teller directory. Tests and embedded use keep it
//! in memory instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::domain::AuthSession;

/// A session as persisted, tagged with the provider that issued it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub provider: String,
    pub session: AuthSession,
}

/// Where an identity adapter keeps its current session
#[derive(Debug)]
pub enum SessionSlot {
    File(PathBuf),
    Memory(Mutex<Option<StoredSession>>),
}

impl SessionSlot {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SessionSlot::File(path.into())
    }

    pub fn memory() -> Self {
        SessionSlot::Memory(Mutex::new(None))
    }

    /// Load the stored session if it was issued by `provider`
    pub fn load(&self, provider: &str) -> Result<Option<StoredSession>> {
        let stored = match self {
            SessionSlot::File(path) => {
                if !path.exists() {
                    return Ok(None);
                }
                let content = fs::read_to_string(path)?;
                // A corrupt file is treated as signed out
                serde_json::from_str::<StoredSession>(&content).ok()
            }
            SessionSlot::Memory(slot) => slot
                .lock()
                .map_err(|e| anyhow!("Lock poisoned: {}", e))?
                .clone(),
        };
        Ok(stored.filter(|s| s.provider == provider))
    }

    pub fn save(&self, stored: &StoredSession) -> Result<()> {
        match self {
            SessionSlot::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let content = serde_json::to_string_pretty(stored)?;
                fs::write(path, content)?;
                restrict_permissions(path)?;
            }
            SessionSlot::Memory(slot) => {
                *slot.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))? = Some(stored.clone());
            }
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match self {
            SessionSlot::File(path) => {
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
            SessionSlot::Memory(slot) => {
                *slot.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))? = None;
            }
        }
        Ok(())
    }
}

/// Session files hold bearer tokens; keep them owner-readable only
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
