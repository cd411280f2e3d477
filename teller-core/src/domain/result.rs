//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Core library error type
///
/// Validation and floor-rule errors are raised before any remote call is
/// made. `Persistence` covers failed reads and writes against the data
/// service. `UnloggedMutation` is the one error that leaves remote state
/// changed: the balance was written but the transaction record was not.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error(
        "Current account balance must remain at least {minimum}: balance {balance}, requested {requested}"
    )]
    MinimumBalance {
        balance: i64,
        requested: i64,
        minimum: i64,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(
        "Balance of account {account_id} was updated to {balance} but the transaction record could not be written: {reason}"
    )]
    UnloggedMutation {
        account_id: Uuid,
        balance: i64,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Stable short name of the variant, safe to record in event logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Validation(_) => "validation",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::MinimumBalance { .. } => "minimum_balance",
            Self::Persistence(_) => "persistence",
            Self::UnloggedMutation { .. } => "unlogged_mutation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }

    /// True for errors that are raised before any remote call
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InsufficientFunds { .. } | Self::MinimumBalance { .. }
        )
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(Error::UnloggedMutation {
                account_id,
                balance,
                reason,
            }) => {
                let mut context = HashMap::new();
                context.insert("account_id".to_string(), serde_json::json!(account_id));
                context.insert("balance".to_string(), serde_json::json!(balance));
                let message = Error::UnloggedMutation {
                    account_id,
                    balance,
                    reason,
                }
                .to_string();
                Self::fail_with_context(message, context)
            }
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i64> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result() {
        let err: Result<i64> = Err(Error::validation("amount must be positive"));
        let result: OperationResult<i64> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Validation error"));
    }

    #[test]
    fn test_unlogged_mutation_carries_context() {
        let account_id = Uuid::new_v4();
        let err: Result<i64> = Err(Error::UnloggedMutation {
            account_id,
            balance: 1500,
            reason: "timeout".to_string(),
        });
        let result: OperationResult<i64> = err.into();
        let context = result.context.unwrap();
        assert_eq!(context["balance"], serde_json::json!(1500));
        assert_eq!(context["account_id"], serde_json::json!(account_id));
    }

    #[test]
    fn test_rejections() {
        assert!(Error::validation("x").is_rejection());
        assert!(Error::InsufficientFunds { balance: 1, requested: 2 }.is_rejection());
        assert!(!Error::persistence("x").is_rejection());
    }
}
