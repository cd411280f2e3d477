//! Deposit, withdraw and balance commands

use anyhow::Result;
use colored::Colorize;
use teller_core::{Error, OperationResult, Transaction, TransactionKind};

use super::{get_context, use_account};
use crate::output;

pub fn run_deposit(amount: i64, account: Option<String>, json: bool) -> Result<()> {
    run_mutation(TransactionKind::Deposit, amount, account, json)
}

pub fn run_withdraw(amount: i64, account: Option<String>, json: bool) -> Result<()> {
    run_mutation(TransactionKind::Withdrawal, amount, account, json)
}

fn run_mutation(kind: TransactionKind, amount: i64, account: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account = use_account(&ctx, account.as_deref())?;

    let result = match kind {
        TransactionKind::Deposit => ctx.ledger.deposit(amount),
        TransactionKind::Withdrawal => ctx.ledger.withdraw(amount),
    };

    if json {
        let response: OperationResult<Transaction> = result.into();
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    match result {
        Ok(transaction) => {
            let verb = match kind {
                TransactionKind::Deposit => "Deposited",
                TransactionKind::Withdrawal => "Withdrew",
            };
            output::success(&format!(
                "{} {} {} account {}",
                verb,
                output::format_amount(transaction.amount),
                if kind == TransactionKind::Deposit { "into" } else { "from" },
                account.account_number
            ));
            println!("  New balance: {}", output::format_amount(transaction.balance_after).bold());
            Ok(())
        }
        Err(Error::UnloggedMutation { balance, reason, .. }) => {
            output::warning(&format!(
                "The balance is now {}, but the transaction could not be recorded: {}",
                output::format_amount(balance),
                reason
            ));
            output::warning("It will be missing from 'teller history'.");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run_balance(account: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account = use_account(&ctx, account.as_deref())?;
    let balance = ctx.ledger.get_balance();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "account_id": account.id,
                "account_number": account.account_number,
                "kind": account.kind,
                "balance": balance,
                "minimum_balance": account.kind.minimum_balance(),
            }))?
        );
        return Ok(());
    }

    println!(
        "{} account {}",
        account.kind.to_string().bold(),
        account.account_number
    );
    println!("  Balance:   {}", output::format_amount(balance).bold());
    println!(
        "  Available: {}",
        output::format_amount(balance - account.kind.minimum_balance())
    );
    Ok(())
}
