//! Teller CLI - a small bank in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use teller_core::LogEvent;

mod commands;
mod output;

use commands::{accounts, auth, backend, history, logs, money};

/// Teller - savings and current accounts in your terminal
#[derive(Parser)]
#[command(name = "teller", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new identity and sign in
    Signup {
        /// E-mail address (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Display name (prompted if omitted)
        #[arg(long)]
        name: Option<String>,
        /// Password (or TELLER_PASSWORD env var; prompted if omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sign in with e-mail and password
    Login {
        /// E-mail address (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Password (or TELLER_PASSWORD env var; prompted if omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sign out and forget the persisted session
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the signed-in identity
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List, open and select accounts
    Accounts {
        #[command(subcommand)]
        command: accounts::AccountsCommands,
    },

    /// Deposit into the selected account
    Deposit {
        /// Amount in whole currency units
        #[arg(allow_negative_numbers = true)]
        amount: i64,
        /// Account number to use instead of the selected account
        #[arg(long)]
        account: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Withdraw from the selected account
    Withdraw {
        /// Amount in whole currency units
        #[arg(allow_negative_numbers = true)]
        amount: i64,
        /// Account number to use instead of the selected account
        #[arg(long)]
        account: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the balance of the selected account
    Balance {
        /// Account number to use instead of the selected account
        #[arg(long)]
        account: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the transaction history of the selected account
    History {
        /// Account number to use instead of the selected account
        #[arg(long)]
        account: Option<String>,
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or switch the backend (local or hosted)
    Backend {
        /// Backend to switch to
        kind: Option<String>,
        /// Hosted service URL
        #[arg(long)]
        url: Option<String>,
        /// Hosted service API key
        #[arg(long)]
        api_key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage event logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Name recorded in the event log
    fn name(&self) -> &'static str {
        match self {
            Commands::Signup { .. } => "signup",
            Commands::Login { .. } => "login",
            Commands::Logout { .. } => "logout",
            Commands::Whoami { .. } => "whoami",
            Commands::Accounts { command } => command.name(),
            Commands::Deposit { .. } => "deposit",
            Commands::Withdraw { .. } => "withdraw",
            Commands::Balance { .. } => "balance",
            Commands::History { .. } => "history",
            Commands::Backend { .. } => "backend",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.name();

    let logger = commands::get_logger();
    let backend = commands::configured_backend();
    commands::log_event(
        &logger,
        LogEvent::new("command_executed")
            .with_command(command)
            .with_backend(backend.as_str()),
    );

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::log_event(
                &logger,
                LogEvent::new("command_failed")
                    .with_command(command)
                    .with_backend(backend.as_str())
                    .with_error(commands::error_code(&e)),
            );
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Signup { email, name, password, json } => auth::run_signup(email, name, password, json),
        Commands::Login { email, password, json } => auth::run_login(email, password, json),
        Commands::Logout { json } => auth::run_logout(json),
        Commands::Whoami { json } => auth::run_whoami(json),
        Commands::Accounts { command } => accounts::run(command),
        Commands::Deposit { amount, account, json } => money::run_deposit(amount, account, json),
        Commands::Withdraw { amount, account, json } => money::run_withdraw(amount, account, json),
        Commands::Balance { account, json } => money::run_balance(account, json),
        Commands::History { account, limit, json } => history::run(account, limit, json),
        Commands::Backend { kind, url, api_key, json } => backend::run(kind, url, api_key, json),
        Commands::Logs { command } => logs::run(command),
    }
}
