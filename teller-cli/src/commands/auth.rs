//! Signup, login, logout and whoami commands

use std::env;

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Input, Password};
use teller_core::{Error, Identity, OperationResult};

use super::{get_context, open_context, require_identity};
use crate::output;

/// Get password from --password flag, TELLER_PASSWORD env var, or prompt
fn get_password_or_prompt(password_flag: Option<String>, confirm: bool) -> Result<String> {
    if let Some(p) = password_flag {
        return Ok(p);
    }

    if let Ok(p) = env::var("TELLER_PASSWORD") {
        return Ok(p);
    }

    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

fn get_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(Input::<String>::new().with_prompt(prompt).interact_text()?),
    }
}

fn print_identity(identity: &Identity, backend: &str) {
    println!("{}", identity.display_name.bold());
    println!("  E-mail:  {}", identity.email);
    println!("  Id:      {}", identity.id.to_string().dimmed());
    println!("  Backend: {}", backend);
}

pub fn run_signup(
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    if let Some(current) = ctx.session.current() {
        anyhow::bail!("Already signed in as {}. Run 'teller logout' first.", current.email);
    }

    let email = get_or_prompt(email, "E-mail")?;
    let name = get_or_prompt(name, "Display name")?;
    let password = get_password_or_prompt(password, true)?;

    let result = ctx.session.sign_up(&email, &password, &name);

    // The identity exists even when the profile record failed to save
    let profile_error = match &result {
        Err(Error::Persistence(message)) if ctx.session.is_authenticated() => Some(message.clone()),
        _ => None,
    };

    if json {
        let response: OperationResult<Identity> = match (&profile_error, ctx.session.current()) {
            (Some(_), Some(identity)) => OperationResult::ok(identity),
            _ => result.into(),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    match profile_error {
        Some(message) => {
            output::warning(&format!("Signed up, but the profile could not be saved: {}", message));
        }
        None => {
            let identity = result?;
            output::success(&format!("Welcome, {}!", identity.display_name));
        }
    }
    output::info("Open your first account with 'teller accounts new <savings|current>'.");
    Ok(())
}

pub fn run_login(email: Option<String>, password: Option<String>, json: bool) -> Result<()> {
    let mut ctx = get_context()?;
    let email = get_or_prompt(email, "E-mail")?;
    let password = get_password_or_prompt(password, false)?;

    let result = ctx.session.sign_in(&email, &password);
    let load_error = ctx.ledger.take_load_error();
    if result.is_ok() {
        ctx.remember_selection()?;
    }

    if json {
        let response: OperationResult<Identity> = result.into();
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let identity = result?;
    output::success(&format!("Signed in as {}", identity.display_name));
    if let Some(message) = load_error {
        output::warning(&format!("Accounts could not be loaded: {}", message));
    } else {
        let count = ctx.ledger.accounts().len();
        println!("  {} account(s)", count);
    }
    Ok(())
}

pub fn run_logout(json: bool) -> Result<()> {
    let mut ctx = open_context()?;
    let result = ctx.session.sign_out();
    ctx.remember_selection()?;

    if json {
        let response: OperationResult<()> = result.into();
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match result {
        Ok(()) => output::success("Signed out"),
        Err(e) => output::warning(&format!("Signed out locally; the backend reported: {}", e)),
    }
    Ok(())
}

pub fn run_whoami(json: bool) -> Result<()> {
    let ctx = get_context()?;

    if json {
        let current = ctx.session.current();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "authenticated": current.is_some(),
                "identity": current,
                "backend": ctx.backend_name(),
            }))?
        );
        return Ok(());
    }

    let identity = require_identity(&ctx)?;
    print_identity(&identity, ctx.backend_name());
    Ok(())
}
