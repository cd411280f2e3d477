//! History command - transactions of the selected account, newest first

use anyhow::Result;
use colored::Colorize;
use teller_core::TransactionKind;

use super::{get_context, use_account};
use crate::output;

pub fn run(account: Option<String>, limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account = use_account(&ctx, account.as_deref())?;

    let transactions: Vec<_> = ctx.ledger.transactions().into_iter().take(limit).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    println!(
        "{} account {}  balance {}",
        account.kind.to_string().bold(),
        account.account_number,
        output::format_amount(account.balance)
    );

    if transactions.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Date", "Type", "Amount", "Balance after"]);
    for tx in &transactions {
        let amount = output::format_signed(tx.signed_amount());
        let amount = match tx.kind {
            TransactionKind::Deposit => amount.green().to_string(),
            TransactionKind::Withdrawal => amount.red().to_string(),
        };
        table.add_row(vec![
            output::format_datetime(&tx.created_at),
            tx.kind.to_string(),
            amount,
            output::format_amount(tx.balance_after),
        ]);
    }
    println!("{}", table);
    Ok(())
}
