use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{self, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::collector::{self, CycleReport, UsageTable};
use crate::core::config::AppConfig;
use crate::core::providers::claude;
use crate::core::providers::Tool;
use crate::core::state::StateStore;
use crate::core::upload::Uploader;

#[derive(Serialize)]
struct UploadOutcome {
    tool: Tool,
    ok: bool,
    message: String,
}

#[derive(Serialize)]
struct CyclePayload<'a> {
    collected_at: DateTime<Utc>,
    cursor_available: bool,
    claude_available: bool,
    table: &'a UsageTable,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    uploads: Vec<UploadOutcome>,
}

impl<'a> From<&'a CycleReport> for CyclePayload<'a> {
    fn from(report: &'a CycleReport) -> Self {
        Self {
            collected_at: report.collected_at,
            cursor_available: report.results.cursor.is_some(),
            claude_available: report.results.claude.is_some(),
            table: &report.table,
            uploads: report
                .uploads
                .iter()
                .map(|(tool, outcome)| UploadOutcome {
                    tool: *tool,
                    ok: outcome.is_ok(),
                    message: match outcome {
                        Ok(m) => m.clone(),
                        Err(e) => e.to_string(),
                    },
                })
                .collect(),
        }
    }
}

fn print_cycle(report: &CycleReport, next_at: Option<&DateTime<Utc>>, opts: &OutputOptions) {
    match opts.format {
        OutputFormat::Text => {
            println!("{}\n", renderer::render_cycle(report, next_at, opts.use_color));
        }
        OutputFormat::Json => {
            if let Err(e) = output::print_json(&CyclePayload::from(report), opts) {
                tracing::warn!(error = %e, "failed to encode cycle summary");
            }
        }
    }
}

fn build_uploader(config: &AppConfig, live: bool) -> Result<Option<Uploader>> {
    if !live {
        tracing::info!("local mode: results are displayed but not sent");
        return Ok(None);
    }
    if config.api_token().is_none() {
        eprintln!("No API token configured. Run `ai-usage-tracker configure <TOKEN>` first.");
    }
    let uploader = Uploader::from_config(config).context("Failed to set up uploader")?;
    tracing::info!(endpoint = %uploader.endpoint(), "live mode: sending to dashboard");
    Ok(Some(uploader))
}

/// Collect on an interval until Ctrl-C.
pub async fn monitor(live: bool, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let uploader = build_uploader(&config, live)?;
    let store = StateStore::default_location();

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    if matches!(opts.format, OutputFormat::Text) {
        eprintln!(
            "Monitoring every {}s ({} mode). Press Ctrl-C to stop.",
            config.settings.interval_secs,
            if live { "live" } else { "local" }
        );
    }

    let interval = chrono::Duration::from_std(config.interval()).unwrap_or_else(|_| chrono::Duration::minutes(5));
    collector::run(&config, &store, uploader.as_ref(), shutdown, |report| {
        let next_at = report.collected_at + interval;
        print_cycle(report, Some(&next_at), opts);
    })
    .await;

    Ok(())
}

/// Run a single collection cycle.
pub async fn once(live: bool, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let uploader = build_uploader(&config, live)?;
    let store = StateStore::default_location();
    collector::reset_throttle(&store);

    // Show spinner on stderr (text mode only)
    let spinner = if matches!(opts.format, OutputFormat::Text) && !opts.verbose {
        Some(tokio::spawn(async move {
            let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let mut i = 0usize;
            loop {
                eprint!("\r {} Collecting usage data...", frames[i % frames.len()]);
                i = i.wrapping_add(1);
                tokio::time::sleep(std::time::Duration::from_millis(80)).await;
            }
        }))
    } else {
        None
    };

    let report = collector::run_once(&config, &store, uploader.as_ref()).await;

    if let Some(s) = spinner {
        s.abort();
        eprint!("\r\x1b[2K");
    }

    print_cycle(&report, None, opts);

    let failed_upload = report.uploads.iter().any(|(_, outcome)| outcome.is_err());
    if failed_upload {
        anyhow::bail!("one or more uploads failed");
    }
    Ok(())
}

/// Show the ccusage month-by-month history.
pub async fn monthly(opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let report = claude::collect_monthly(&config.claude)
        .await
        .context("Failed to collect Claude Code monthly usage")?;

    match opts.format {
        OutputFormat::Text => println!("{}", renderer::render_monthly(&report, opts.use_color)),
        OutputFormat::Json => output::print_json(&report, opts)?,
    }
    Ok(())
}
