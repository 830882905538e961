use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::aggregate;
use crate::core::collector;
use crate::core::config::AppConfig;
use crate::core::state::StateStore;
use crate::core::upload::{user_agent, Uploader};

#[derive(Serialize)]
struct ApiInfo {
    endpoint: String,
    method: &'static str,
    headers: Vec<(&'static str, String)>,
    generated_at: String,
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Collect once and write the exact upload bodies to `dir` instead of sending them.
pub async fn run(dir: Option<PathBuf>, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let store = StateStore::default_location();
    let dir = dir.unwrap_or_else(|| PathBuf::from("exports"));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;

    collector::reset_throttle(&store);
    let results = collector::collect_both(&config, &store, Utc::now()).await;
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let mut written: Vec<PathBuf> = Vec::new();

    if let Some(usage) = &results.cursor {
        let payload = aggregate::cursor_payload(usage);
        written.push(write_json(&dir, &format!("cursor_api_data_{}.json", stamp), &payload)?);
    }
    if let Some(usage) = &results.claude {
        let payload = aggregate::claude_payload(usage);
        written.push(write_json(&dir, &format!("claude_api_data_{}.json", stamp), &payload)?);
    }

    let endpoint = Uploader::from_config(&config)
        .map(|u| u.endpoint())
        .unwrap_or_else(|_| config.api_url());
    let info = ApiInfo {
        endpoint,
        method: "POST",
        headers: vec![
            ("Authorization", "Token <API_TOKEN>".to_string()),
            ("Content-Type", "application/json".to_string()),
            ("X-Tracker-Auth", "ServerBearer <SERVER_JWT>".to_string()),
            ("User-Agent", user_agent()),
        ],
        generated_at: stamp.clone(),
    };
    written.push(write_json(&dir, &format!("api_info_{}.json", stamp), &info)?);

    match opts.format {
        OutputFormat::Text => {
            if results.cursor.is_none() && results.claude.is_none() {
                eprintln!("No usage data collected; only the API description was written.");
            }
            for path in &written {
                println!("Wrote {}", path.display());
            }
        }
        OutputFormat::Json => {
            let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
            println!("{}", serde_json::to_string(&paths)?);
        }
    }
    Ok(())
}
