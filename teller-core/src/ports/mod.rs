//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod data_store;
mod identity;

pub use data_store::{DataStore, Filter, Order, Table};
pub use identity::IdentityProvider;
pub use crate::domain::Row;
