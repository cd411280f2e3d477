//! Accounts commands - list, open and select accounts

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use teller_core::{Account, AccountKind, OperationResult};
use uuid::Uuid;

use super::{get_context, require_identity};
use crate::output;

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// List your accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open a new account and select it
    New {
        /// Account type
        #[arg(value_enum)]
        kind: KindArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Select the account used by deposit, withdraw, balance and history
    Select {
        /// Account number (or account id)
        account: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl AccountsCommands {
    pub fn name(&self) -> &'static str {
        match self {
            AccountsCommands::List { .. } => "accounts_list",
            AccountsCommands::New { .. } => "accounts_new",
            AccountsCommands::Select { .. } => "accounts_select",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Savings,
    Current,
}

impl From<KindArg> for AccountKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Savings => AccountKind::Savings,
            KindArg::Current => AccountKind::Current,
        }
    }
}

pub fn run(command: AccountsCommands) -> Result<()> {
    match command {
        AccountsCommands::List { json } => run_list(json),
        AccountsCommands::New { kind, json } => run_new(kind.into(), json),
        AccountsCommands::Select { account, json } => run_select(&account, json),
    }
}

fn run_list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    require_identity(&ctx)?;

    let accounts = ctx.ledger.accounts();
    let selected = ctx.ledger.selected_account().map(|a| a.id);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "selected": selected,
                "accounts": accounts,
            }))?
        );
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts yet. Open one with 'teller accounts new <savings|current>'.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["", "Number", "Type", "Balance", "Opened"]);
    for account in &accounts {
        let marker = if Some(account.id) == selected { "*" } else { "" };
        table.add_row(vec![
            marker.to_string(),
            account.account_number.clone(),
            account.kind.to_string(),
            output::format_amount(account.balance),
            output::format_datetime(&account.created_at),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_new(kind: AccountKind, json: bool) -> Result<()> {
    let mut ctx = get_context()?;
    let identity = require_identity(&ctx)?;

    let result = ctx.ledger.create_account(kind, identity.id);
    if result.is_ok() {
        ctx.remember_selection()?;
    }

    if json {
        let response: OperationResult<Account> = result.into();
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let account = result?;
    output::success(&format!("Opened {} account {}", account.kind, account.account_number));
    println!("  Opening balance: {}", output::format_amount(account.balance));
    if account.kind.minimum_balance() > 0 {
        println!(
            "  {}",
            format!(
                "The balance must stay at or above {}.",
                output::format_amount(account.kind.minimum_balance())
            )
            .dimmed()
        );
    }
    Ok(())
}

fn run_select(reference: &str, json: bool) -> Result<()> {
    let mut ctx = get_context()?;
    require_identity(&ctx)?;

    let mut found = ctx.ledger.select_account_number(reference)?;
    if !found {
        if let Ok(id) = Uuid::parse_str(reference) {
            found = ctx.ledger.select_account(id)?;
        }
    }
    if !found {
        anyhow::bail!("No account with number {}", reference);
    }
    ctx.remember_selection()?;

    let account = ctx
        .ledger
        .selected_account()
        .ok_or_else(|| anyhow::anyhow!("No account selected"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&OperationResult::ok(&account))?);
        return Ok(());
    }

    output::success(&format!("Selected {} account {}", account.kind, account.account_number));
    println!("  Balance: {}", output::format_amount(account.balance));
    Ok(())
}
