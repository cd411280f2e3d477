//! Backend command - show or switch between the local and hosted backends

use anyhow::Result;
use colored::Colorize;
use teller_core::config::{BackendKind, Config};

use super::get_teller_dir;
use crate::output;

pub fn run(kind: Option<String>, url: Option<String>, api_key: Option<String>, json: bool) -> Result<()> {
    let teller_dir = get_teller_dir();
    let mut config = Config::load(&teller_dir)?;

    if let Some(kind) = kind {
        let backend: BackendKind = kind.parse()?;
        let switched = backend != config.backend;
        config.set_backend(backend, url, api_key);
        if backend == BackendKind::Hosted {
            config.hosted_credentials()?;
        }
        // Account ids do not carry over between backends
        if switched {
            config.selected_account = None;
        }
        config.save(&teller_dir)?;

        if !json {
            output::success(&format!("Using the {} backend", backend));
            if switched {
                output::info("Sign in again with 'teller login'.");
            }
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "backend": config.backend,
                "url": config.hosted_url,
                "api_key_set": config.hosted_api_key.is_some(),
            }))?
        );
        return Ok(());
    }

    println!("Backend: {}", config.backend.to_string().bold());
    if config.backend == BackendKind::Hosted {
        println!("  URL:     {}", config.hosted_url.as_deref().unwrap_or("(not set)"));
        println!(
            "  API key: {}",
            if config.hosted_api_key.is_some() { "set" } else { "(not set)" }
        );
    }
    println!("  Data:    {}", teller_dir.display().to_string().dimmed());
    Ok(())
}
