//! CLI command implementations

pub mod accounts;
pub mod auth;
pub mod backend;
pub mod history;
pub mod logs;
pub mod money;

use std::path::PathBuf;

use anyhow::{Context, Result};
use teller_core::config::Config;
use teller_core::{Account, EntryPoint, Error, Identity, LogEvent, LoggingService, TellerContext};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let teller_dir = get_teller_dir();
    std::fs::create_dir_all(&teller_dir).ok()?;
    LoggingService::new(&teller_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the teller directory from environment or default
pub fn get_teller_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TELLER_DIR") {
        PathBuf::from(dir)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".teller")
    }
}

/// Backend named by the current settings, for log entries
pub fn configured_backend() -> String {
    Config::load(&get_teller_dir())
        .map(|c| c.backend.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Error category recorded in the event log
///
/// Messages can carry amounts or account numbers, so only the kind is kept.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::code)
        .unwrap_or("cli")
}

/// Open the context without touching the persisted session
pub fn open_context() -> Result<TellerContext> {
    let teller_dir = get_teller_dir();

    std::fs::create_dir_all(&teller_dir)
        .with_context(|| format!("Failed to create teller directory: {:?}", teller_dir))?;

    TellerContext::new(&teller_dir).context("Failed to initialize teller context")
}

/// Open the context and restore the persisted session
pub fn get_context() -> Result<TellerContext> {
    let ctx = open_context()?;
    ctx.restore().context("Failed to restore session")?;
    Ok(ctx)
}

/// The signed-in identity, or an error telling the user to sign in
pub fn require_identity(ctx: &TellerContext) -> Result<Identity> {
    ctx.session
        .current()
        .ok_or_else(|| anyhow::anyhow!("Not signed in. Run 'teller login' or 'teller signup' first."))
}

/// Select `account_number` if given, then return the selected account
pub fn use_account(ctx: &TellerContext, account_number: Option<&str>) -> Result<Account> {
    require_identity(ctx)?;

    if let Some(number) = account_number {
        if !ctx.ledger.select_account_number(number)? {
            anyhow::bail!("No account with number {}", number);
        }
    }

    ctx.ledger
        .selected_account()
        .ok_or_else(|| anyhow::anyhow!("No account selected. Open one with 'teller accounts new <savings|current>'."))
}
