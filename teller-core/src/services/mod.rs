//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod ledger;
pub mod logging;
pub mod migration;
pub mod session;

pub use ledger::LedgerStore;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use session::{SessionListener, SessionStore, SubscriptionId};
