//! Data store port - row storage abstraction

use std::fmt;

use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::Row;

/// Collections exposed by the data service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Accounts,
    Transactions,
    Users,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Transactions => "transactions",
            Table::Users => "users",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on a single column
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: JsonValue,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Single-column sort order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Data store trait
///
/// Generic row access against the data service. Filters are ANDed together.
/// Writes return the rows as stored, including service-assigned columns
/// (`id`, `created_at`). Failures are reported as `Error::Persistence`.
pub trait DataStore: Send + Sync {
    /// Read rows matching all filters
    fn select(&self, table: Table, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>>;

    /// Insert one row and return it as stored
    fn insert(&self, table: Table, row: Row) -> Result<Row>;

    /// Apply `patch` to all rows matching the filters and return them
    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<Vec<Row>>;
}
