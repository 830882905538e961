use anyhow::{Context, Result};

use crate::cli::output::OutputOptions;
use crate::core::config::AppConfig;
use crate::core::process;

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let path = AppConfig::default()
        .save()
        .context("Failed to generate config")?;
    println!("Generated config at {}", path.display());
    println!("  Set your API token with `ai-usage-tracker configure <TOKEN>`.");
    Ok(())
}

/// Store the dashboard API token in the config file.
pub fn configure(token: &str, _opts: &OutputOptions) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("API token must not be empty");
    }

    let mut config = AppConfig::load().context("Failed to load config")?;
    config.auth.api_token = Some(token.to_string());
    let path = config.save().context("Failed to save config")?;
    println!("API token saved to {}", path.display());
    Ok(())
}

pub fn check(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    let config = AppConfig::load().context("Failed to load config")?;
    if !path.exists() {
        eprintln!("No config file found at {} (using defaults)", path.display());
    }

    let issues = config.validate();
    let db_path = config.cursor.resolved_db_path();
    let ccusage = config
        .claude
        .command
        .split_whitespace()
        .next()
        .and_then(process::which);

    println!(
        "  Cursor database  {}",
        if db_path.exists() {
            db_path.display().to_string()
        } else {
            format!("not found ({})", db_path.display())
        }
    );
    println!(
        "  ccusage          {}",
        match &ccusage {
            Some(p) => p.display().to_string(),
            None => "not found (install with: npm install -g ccusage)".to_string(),
        }
    );
    println!(
        "  API token        {}",
        if config.api_token().is_some() { "configured" } else { "missing" }
    );
    println!("  Dashboard        {}", config.api_url());

    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}
