//! Ledger service - accounts, selection and balance mutations
//!
//! The ledger is a single-writer store: all state sits behind one mutex and
//! each operation holds it until the data service has answered, so a
//! mutation always validates against the balance left by the previous one.
//!
//! A mutation performs two dependent writes. The balance update goes first;
//! if it fails the request is rejected and nothing was written. The
//! transaction record goes second; if that fails the balance has already
//! changed remotely and the caller receives `Error::UnloggedMutation`.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountKind, SessionEvent, Transaction, TransactionKind};
use crate::ports::{DataStore, Filter, Order, Row, Table};
use crate::services::session::SessionListener;

#[derive(Debug, Default)]
struct LedgerState {
    owner: Option<Uuid>,
    accounts: Vec<Account>,
    selected: Option<Uuid>,
    transactions: Vec<Transaction>,
    load_error: Option<String>,
}

impl LedgerState {
    fn selected_account(&self) -> Option<&Account> {
        let id = self.selected?;
        self.accounts.iter().find(|a| a.id == id)
    }

    fn replace_account(&mut self, account: Account) {
        if let Some(existing) = self.accounts.iter_mut().find(|a| a.id == account.id) {
            *existing = account;
        }
    }
}

/// In-memory projection of the signed-in identity's accounts
pub struct LedgerStore {
    data: Arc<dyn DataStore>,
    state: Mutex<LedgerState>,
}

impl LedgerStore {
    pub fn new(data: Arc<dyn DataStore>) -> Self {
        Self {
            data,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|e| Error::Other(format!("Ledger lock poisoned: {}", e)))
    }

    // === Queries ===

    /// All accounts owned by `owner_id`, most recent first
    pub fn list_accounts(&self, owner_id: Uuid) -> Result<Vec<Account>> {
        self.fetch_accounts(owner_id)
    }

    /// Cached accounts of the current owner
    pub fn accounts(&self) -> Vec<Account> {
        self.lock().map(|s| s.accounts.clone()).unwrap_or_default()
    }

    pub fn selected_account(&self) -> Option<Account> {
        self.lock().ok().and_then(|s| s.selected_account().cloned())
    }

    /// Cached transactions of the selected account, most recent first
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().map(|s| s.transactions.clone()).unwrap_or_default()
    }

    /// Last known balance of the selected account, 0 if none is selected
    pub fn get_balance(&self) -> i64 {
        self.selected_account().map(|a| a.balance).unwrap_or(0)
    }

    /// Error from the last load triggered by a session change, if any
    pub fn take_load_error(&self) -> Option<String> {
        self.lock().ok().and_then(|mut s| s.load_error.take())
    }

    // === Account lifecycle ===

    /// Replace the cached accounts with the owner's accounts
    ///
    /// Keeps the current selection when it is still present, otherwise
    /// selects the most recent account and loads its transactions.
    pub fn load_accounts(&self, owner_id: Uuid) -> Result<Vec<Account>> {
        let mut state = self.lock()?;
        let accounts = self.fetch_accounts(owner_id)?;

        if state.owner != Some(owner_id) {
            state.selected = None;
            state.transactions.clear();
        }
        state.owner = Some(owner_id);
        state.accounts = accounts.clone();

        if state.selected_account().is_none() {
            state.selected = accounts.first().map(|a| a.id);
            state.transactions = match state.selected {
                Some(id) => self.fetch_transactions(id)?,
                None => Vec::new(),
            };
        }

        Ok(accounts)
    }

    /// Open a new account; it becomes the selected account
    pub fn create_account(&self, kind: AccountKind, owner_id: Uuid) -> Result<Account> {
        let mut state = self.lock()?;

        let account_number = Account::generate_account_number();
        let stored = self
            .data
            .insert(Table::Accounts, Account::new_row(owner_id, kind, &account_number))?;
        let account = Account::from_row(stored)?;

        if state.owner != Some(owner_id) {
            state.owner = Some(owner_id);
            state.accounts.clear();
        }
        state.accounts.insert(0, account.clone());
        state.selected = Some(account.id);
        state.transactions.clear();

        Ok(account)
    }

    /// Select a loaded account and load its transactions
    ///
    /// Returns `false` and leaves the selection unchanged when the id is not
    /// among the loaded accounts.
    pub fn select_account(&self, account_id: Uuid) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.accounts.iter().any(|a| a.id == account_id) {
            return Ok(false);
        }

        let transactions = self.fetch_transactions(account_id)?;
        state.selected = Some(account_id);
        state.transactions = transactions;
        Ok(true)
    }

    /// Select a loaded account by its account number
    pub fn select_account_number(&self, account_number: &str) -> Result<bool> {
        let id = self
            .lock()?
            .accounts
            .iter()
            .find(|a| a.account_number == account_number)
            .map(|a| a.id);
        match id {
            Some(id) => self.select_account(id),
            None => Ok(false),
        }
    }

    /// Re-read the selected account's transactions
    pub fn refresh_transactions(&self) -> Result<Vec<Transaction>> {
        let mut state = self.lock()?;
        let Some(id) = state.selected else {
            return Ok(Vec::new());
        };
        state.transactions = self.fetch_transactions(id)?;
        Ok(state.transactions.clone())
    }

    /// Drop all cached state
    pub fn clear(&self) {
        if let Ok(mut state) = self.lock() {
            *state = LedgerState::default();
        }
    }

    // === Balance mutations ===

    pub fn deposit(&self, amount: i64) -> Result<Transaction> {
        self.mutate(TransactionKind::Deposit, amount)
    }

    pub fn withdraw(&self, amount: i64) -> Result<Transaction> {
        self.mutate(TransactionKind::Withdrawal, amount)
    }

    fn mutate(&self, kind: TransactionKind, amount: i64) -> Result<Transaction> {
        let mut state = self.lock()?;

        // Validate against the cached balance
        let account = state
            .selected_account()
            .cloned()
            .ok_or_else(|| Error::validation("no account selected"))?;
        let new_balance = match kind {
            TransactionKind::Deposit => account.deposit_balance(amount)?,
            TransactionKind::Withdrawal => account.withdrawal_balance(amount)?,
        };

        // First write: balance
        let mut patch = Row::new();
        patch.insert("balance".to_string(), JsonValue::from(new_balance));
        let updated = self.data.update(
            Table::Accounts,
            &[Filter::eq("id", account.id.to_string())],
            patch,
        )?;
        let row = updated.into_iter().next().ok_or_else(|| {
            Error::persistence(format!("account {} no longer exists", account.id))
        })?;

        // The balance is written from here on; failures are unlogged mutations
        let confirmed = match Account::from_row(row) {
            Ok(confirmed) => confirmed,
            Err(e) => {
                state.replace_account(Account {
                    balance: new_balance,
                    ..account
                });
                return Err(Error::UnloggedMutation {
                    account_id: account.id,
                    balance: new_balance,
                    reason: format!("unreadable account row after balance update: {}", e),
                });
            }
        };
        let confirmed_balance = confirmed.balance;
        state.replace_account(confirmed);

        // Second write: transaction record
        let record = Transaction::new_row(account.id, kind, amount, confirmed_balance);
        let logged = self
            .data
            .insert(Table::Transactions, record)
            .and_then(Transaction::from_row)
            .map_err(|e| Error::UnloggedMutation {
                account_id: account.id,
                balance: confirmed_balance,
                reason: e.to_string(),
            })?;

        // Refresh from the data service; fall back to the confirmed record
        match self.fetch_transactions(account.id) {
            Ok(transactions) => state.transactions = transactions,
            Err(_) => state.transactions.insert(0, logged.clone()),
        }

        Ok(logged)
    }

    // === Data service reads ===

    fn fetch_accounts(&self, owner_id: Uuid) -> Result<Vec<Account>> {
        self.data
            .select(
                Table::Accounts,
                &[Filter::eq("user_id", owner_id.to_string())],
                Some(&Order::desc("created_at")),
            )?
            .into_iter()
            .map(Account::from_row)
            .collect()
    }

    fn fetch_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.data
            .select(
                Table::Transactions,
                &[Filter::eq("account_id", account_id.to_string())],
                Some(&Order::desc("created_at")),
            )?
            .into_iter()
            .map(Transaction::from_row)
            .collect()
    }
}

impl SessionListener for LedgerStore {
    fn on_session_change(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SignedIn(identity) => {
                if let Err(e) = self.load_accounts(identity.id) {
                    if let Ok(mut state) = self.lock() {
                        state.load_error = Some(e.to_string());
                    }
                }
            }
            SessionEvent::SignedOut => self.clear(),
        }
    }
}
