use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::core::config::ClaudeConfig;
use crate::core::models::ccusage::{DailyReport, MonthlyReport};
use crate::core::process::{self, ProcessError};
use crate::core::providers::cursor::current_month_period;
use crate::core::providers::Tool;

const CCUSAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CcusageError {
    #[error("`{0}` not found. Install it with: npm install -g ccusage")]
    ExecutableNotFound(String),
    #[error("ccusage exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
    #[error("Failed to parse ccusage output: {0}")]
    JsonDecode(#[from] serde_json::Error),
    #[error("ccusage timed out")]
    Timeout,
    #[error("ccusage failed: {0}")]
    Unexpected(String),
}

impl From<ProcessError> for CcusageError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::NotFound(cmd) => Self::ExecutableNotFound(cmd),
            ProcessError::NonZeroExit { status, stderr, .. } => Self::NonZeroExit { status, stderr },
            ProcessError::Timeout(..) => Self::Timeout,
            other => Self::Unexpected(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Daily,
    Monthly,
}

impl Report {
    fn subcommand(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CcusageOptions {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub breakdown: bool,
    pub timezone: Option<String>,
}

impl CcusageOptions {
    fn to_args(&self, report: Report) -> Vec<String> {
        let mut args = vec![report.subcommand().to_string(), "--json".to_string()];
        if let Some(since) = self.since {
            args.push("--since".to_string());
            args.push(since.format("%Y%m%d").to_string());
        }
        if let Some(until) = self.until {
            args.push("--until".to_string());
            args.push(until.format("%Y%m%d").to_string());
        }
        if self.breakdown {
            args.push("--breakdown".to_string());
        }
        if let Some(tz) = &self.timezone {
            args.push("--timezone".to_string());
            args.push(tz.clone());
        }
        args
    }
}

/// Run ccusage and decode its JSON output.
///
/// `command` may carry leading arguments, e.g. `npx ccusage@latest`.
/// Returns the decoded report and the full command line used.
pub async fn invoke<T: DeserializeOwned>(
    command: &str,
    report: Report,
    options: &CcusageOptions,
) -> Result<(T, String), CcusageError> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| CcusageError::Unexpected("empty ccusage command".to_string()))?;
    let mut args: Vec<String> = parts.map(str::to_string).collect();
    args.extend(options.to_args(report));

    let command_used = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let stdout = process::run_command(program, &arg_refs, CCUSAGE_TIMEOUT).await?;
    let decoded = serde_json::from_str(&stdout)?;
    Ok((decoded, command_used))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeCollectionInfo {
    pub tool: Tool,
    pub data_type: String,
    pub has_totals: bool,
    pub has_daily: bool,
    pub daily_entries: usize,
    pub collection_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeMetadata {
    pub data_collection_method: String,
    pub command_used: String,
    pub collection_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClaudeUsage {
    pub report: DailyReport,
    pub collection_info: ClaudeCollectionInfo,
    pub metadata: ClaudeMetadata,
}

/// Daily breakdown from the first of the current month (UTC) to `now`.
pub async fn collect_month_to_date(
    config: &ClaudeConfig,
    now: DateTime<Utc>,
) -> Result<ClaudeUsage, CcusageError> {
    let (since, until) = current_month_period(now);
    let options = CcusageOptions {
        since: Some(since),
        until: Some(until),
        breakdown: true,
        timezone: Some(config.timezone.clone()),
    };
    let (report, command_used): (DailyReport, String) =
        invoke(&config.command, Report::Daily, &options).await?;

    tracing::info!(
        days = report.daily.len(),
        has_totals = report.totals.is_some(),
        "collected Claude Code usage"
    );

    let collection_info = ClaudeCollectionInfo {
        tool: Tool::Claude,
        data_type: "ccusage_daily_breakdown".to_string(),
        has_totals: report.totals.is_some(),
        has_daily: !report.daily.is_empty(),
        daily_entries: report.daily.len(),
        collection_method: "ccusage_cli".to_string(),
    };
    let metadata = ClaudeMetadata {
        data_collection_method: "claude_ccusage_cli".to_string(),
        command_used,
        collection_timestamp: now,
    };

    Ok(ClaudeUsage {
        report,
        collection_info,
        metadata,
    })
}

/// Month-by-month summary over the whole ccusage history.
pub async fn collect_monthly(config: &ClaudeConfig) -> Result<MonthlyReport, CcusageError> {
    let options = CcusageOptions {
        breakdown: true,
        timezone: Some(config.timezone.clone()),
        ..Default::default()
    };
    let (report, _): (MonthlyReport, String) =
        invoke(&config.command, Report::Monthly, &options).await?;
    Ok(report)
}
