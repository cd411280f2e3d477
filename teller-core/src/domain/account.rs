//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::result::{Error, Result};
use super::Row;

/// Kind of bank account. The kind decides the balance floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Savings,
    Current,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Savings => "savings",
            AccountKind::Current => "current",
        }
    }

    /// Lowest balance an account of this kind may hold after a mutation
    pub fn minimum_balance(&self) -> i64 {
        match self {
            AccountKind::Savings => 0,
            AccountKind::Current => 1000,
        }
    }

    /// Opening balance for a newly created account
    pub fn initial_balance(&self) -> i64 {
        self.minimum_balance()
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "savings" => Ok(AccountKind::Savings),
            "current" => Ok(AccountKind::Current),
            other => Err(Error::validation(format!("unknown account type: {}", other))),
        }
    }
}

/// A bank account owned by an identity
///
/// Field names follow the `accounts` table so rows deserialize directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
    pub account_number: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Parse an account from a data service row
    pub fn from_row(row: Row) -> Result<Self> {
        serde_json::from_value(JsonValue::Object(row))
            .map_err(|e| Error::persistence(format!("malformed account row: {}", e)))
    }

    /// Row for inserting a new account. `id` and `created_at` are assigned
    /// by the data service.
    pub fn new_row(owner_id: Uuid, kind: AccountKind, account_number: &str) -> Row {
        let mut row = Row::new();
        row.insert("user_id".to_string(), JsonValue::String(owner_id.to_string()));
        row.insert(
            "account_number".to_string(),
            JsonValue::String(account_number.to_string()),
        );
        row.insert("type".to_string(), JsonValue::String(kind.as_str().to_string()));
        row.insert("balance".to_string(), JsonValue::from(kind.initial_balance()));
        row
    }

    /// Generate a 9-digit account number
    ///
    /// Uniqueness is advisory: numbers are random and never checked against
    /// existing accounts.
    pub fn generate_account_number() -> String {
        rand::thread_rng()
            .gen_range(100_000_000u32..=999_999_999)
            .to_string()
    }

    /// Balance after depositing `amount`
    pub fn deposit_balance(&self, amount: i64) -> Result<i64> {
        validate_amount(amount)?;
        self.balance
            .checked_add(amount)
            .ok_or_else(|| Error::validation("deposit would overflow the account balance"))
    }

    /// Balance after withdrawing `amount`, enforcing the floor rule
    pub fn withdrawal_balance(&self, amount: i64) -> Result<i64> {
        validate_amount(amount)?;
        let candidate = self.balance - amount;
        match self.kind {
            AccountKind::Savings if candidate < 0 => Err(Error::InsufficientFunds {
                balance: self.balance,
                requested: amount,
            }),
            AccountKind::Current if candidate < AccountKind::Current.minimum_balance() => {
                Err(Error::MinimumBalance {
                    balance: self.balance,
                    requested: amount,
                    minimum: AccountKind::Current.minimum_balance(),
                })
            }
            _ => Ok(candidate),
        }
    }

    /// Whether the balance satisfies the floor rule for this kind
    pub fn satisfies_floor(&self) -> bool {
        self.balance >= self.kind.minimum_balance()
    }
}

/// Mutation amounts must be strictly positive
pub fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(kind: AccountKind, balance: i64) -> Account {
        Account {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            account_number: "123456789".to_string(),
            kind,
            balance,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_initial_balances() {
        assert_eq!(AccountKind::Current.initial_balance(), 1000);
        assert_eq!(AccountKind::Savings.initial_balance(), 0);
    }

    #[test]
    fn test_savings_floor() {
        let acc = account(AccountKind::Savings, 500);
        assert!(matches!(
            acc.withdrawal_balance(600),
            Err(Error::InsufficientFunds { balance: 500, requested: 600 })
        ));
        assert_eq!(acc.withdrawal_balance(500).unwrap(), 0);
    }

    #[test]
    fn test_current_floor() {
        let acc = account(AccountKind::Current, 1500);
        assert!(matches!(
            acc.withdrawal_balance(600),
            Err(Error::MinimumBalance { minimum: 1000, .. })
        ));
        assert_eq!(acc.withdrawal_balance(500).unwrap(), 1000);
    }

    #[test]
    fn test_non_positive_amounts() {
        let acc = account(AccountKind::Savings, 100);
        assert!(matches!(acc.deposit_balance(0), Err(Error::Validation(_))));
        assert!(matches!(acc.deposit_balance(-5), Err(Error::Validation(_))));
        assert!(matches!(acc.withdrawal_balance(0), Err(Error::Validation(_))));
    }

    #[test]
    fn test_deposit_overflow() {
        let acc = account(AccountKind::Savings, i64::MAX - 1);
        assert!(matches!(acc.deposit_balance(2), Err(Error::Validation(_))));
    }

    #[test]
    fn test_account_number_shape() {
        for _ in 0..100 {
            let number = Account::generate_account_number();
            assert_eq!(number.len(), 9);
            assert!(!number.starts_with('0'));
            assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_row_round_trip() {
        let owner = Uuid::new_v4();
        let mut row = Account::new_row(owner, AccountKind::Current, "987654321");
        row.insert("id".to_string(), JsonValue::String(Uuid::new_v4().to_string()));
        row.insert(
            "created_at".to_string(),
            JsonValue::String("2025-01-15T10:30:00.123456+00:00".to_string()),
        );

        let acc = Account::from_row(row).unwrap();
        assert_eq!(acc.owner_id, owner);
        assert_eq!(acc.kind, AccountKind::Current);
        assert_eq!(acc.balance, 1000);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Savings".parse::<AccountKind>().unwrap(), AccountKind::Savings);
        assert!("checking".parse::<AccountKind>().is_err());
    }
}
