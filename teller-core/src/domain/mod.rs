//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod transaction;
mod user;
pub mod result;
pub mod session;

pub use account::{validate_amount, Account, AccountKind};
pub use transaction::{Transaction, TransactionKind};
pub use user::{Identity, Profile};
pub use session::{AuthSession, AuthUser, SessionEvent};

/// A row exchanged with the data service, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;
