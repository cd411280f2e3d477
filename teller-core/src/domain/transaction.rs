//! Transaction domain model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::result::{Error, Result};
use super::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only ledger entry, written once per committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    /// Account balance immediately after this mutation
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Parse a transaction from a data service row
    pub fn from_row(row: Row) -> Result<Self> {
        serde_json::from_value(JsonValue::Object(row))
            .map_err(|e| Error::persistence(format!("malformed transaction row: {}", e)))
    }

    /// Row for appending a new entry. `id` and `created_at` are assigned
    /// by the data service.
    pub fn new_row(
        account_id: Uuid,
        kind: TransactionKind,
        amount: i64,
        balance_after: i64,
    ) -> Row {
        let mut row = Row::new();
        row.insert(
            "account_id".to_string(),
            JsonValue::String(account_id.to_string()),
        );
        row.insert("type".to_string(), JsonValue::String(kind.as_str().to_string()));
        row.insert("amount".to_string(), JsonValue::from(amount));
        row.insert("balance_after".to_string(), JsonValue::from(balance_after));
        row
    }

    /// Signed effect of this entry on the account balance
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Deposit => self.amount,
            TransactionKind::Withdrawal => -self.amount,
        }
    }
}
