use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::aggregate;
use crate::core::config::{AppConfig, BillingPeriodMode};
use crate::core::providers::claude::{self, ClaudeUsage};
use crate::core::providers::cursor::{self, CursorUsage};
use crate::core::providers::Tool;
use crate::core::state::{self, CollectionState, StateStore};
use crate::core::upload::{UploadError, Uploader};

/// Shown when ccusage reports totals without a per-model breakdown.
pub const FALLBACK_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(300);

/// What one cycle collected. `None` means the source had nothing or failed.
#[derive(Debug, Default)]
pub struct CycleResults {
    pub cursor: Option<CursorUsage>,
    pub claude: Option<ClaudeUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub tool: Tool,
    pub model: String,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTable {
    pub rows: Vec<TableRow>,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Per-model rows for both sources plus the combined total.
///
/// Cursor rows come from the billing-period summary. Claude rows are listed only
/// when ccusage reported totals, and the total row uses those totals.
pub fn build_usage_table(cursor: Option<&CursorUsage>, claude: Option<&ClaudeUsage>) -> UsageTable {
    let mut table = UsageTable::default();

    if let Some(cursor) = cursor {
        for (model, usage) in &cursor.billing_summary.model_usage {
            table.rows.push(TableRow {
                tool: Tool::Cursor,
                model: model.clone(),
                tokens: usage.tokens,
                cost: usage.cost,
            });
            table.total_tokens = table.total_tokens.saturating_add(usage.tokens);
            table.total_cost += usage.cost;
        }
    }

    if let Some(totals) = claude.and_then(|c| c.report.totals.as_ref()) {
        table.total_tokens = table.total_tokens.saturating_add(totals.total_tokens);
        table.total_cost += totals.total_cost;

        let mut per_model: BTreeMap<&str, (u64, f64)> = BTreeMap::new();
        for day in claude.map(|c| c.report.daily.as_slice()).unwrap_or_default() {
            for b in &day.model_breakdowns {
                let Some(model) = b.model_name.as_deref() else {
                    continue;
                };
                let entry = per_model.entry(model).or_default();
                entry.0 = entry
                    .0
                    .saturating_add(b.input_tokens.saturating_add(b.output_tokens));
                entry.1 += b.cost;
            }
        }

        if per_model.is_empty() {
            table.rows.push(TableRow {
                tool: Tool::Claude,
                model: FALLBACK_CLAUDE_MODEL.to_string(),
                tokens: totals.total_tokens,
                cost: totals.total_cost,
            });
        } else {
            table.rows.extend(per_model.into_iter().map(|(model, (tokens, cost))| TableRow {
                tool: Tool::Claude,
                model: model.to_string(),
                tokens,
                cost,
            }));
        }
    }

    table
}

fn unix_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

fn billing_period(
    config: &AppConfig,
    state: &CollectionState,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match config.settings.billing_period {
        BillingPeriodMode::Calendar => cursor::current_month_period(now),
        BillingPeriodMode::Anchored => cursor::billing_period_containing(state.billing_anchor_date, now)
            .unwrap_or_else(|| cursor::current_month_period(now)),
    }
}

/// Collect both sources concurrently. A failing source is logged and becomes `None`.
///
/// Cursor is skipped while the last export is younger than the minimum fetch interval.
pub async fn collect_both(config: &AppConfig, store: &StateStore, now: DateTime<Utc>) -> CycleResults {
    let mut state = store.load();

    let cursor_task = async {
        if !state::should_fetch(state.last_fetch_timestamp, config.min_fetch_interval(), unix_seconds(now)) {
            tracing::info!("skipping Cursor export: fetched recently");
            return None;
        }
        let period = billing_period(config, &state, now);
        match cursor::collect(config, period, now).await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!(error = %e, "Cursor collection failed");
                None
            }
        }
    };
    let claude_task = async {
        match claude::collect_month_to_date(&config.claude, now).await {
            Ok(usage) => Some(usage),
            Err(e) => {
                tracing::warn!(error = %e, "Claude Code collection failed");
                None
            }
        }
    };

    let (cursor, claude) = tokio::join!(cursor_task, claude_task);

    if let Some(usage) = &cursor {
        state.last_fetch_timestamp = unix_seconds(now);
        state.last_sent_summary = Some(usage.billing_summary.clone());
        store.save_or_warn(&state);
    }

    CycleResults { cursor, claude }
}

/// Upload each present result. One failed send does not affect the other.
pub async fn send_results(uploader: &Uploader, results: &CycleResults) -> Vec<(Tool, Result<String, UploadError>)> {
    let mut outcomes = Vec::new();

    if let Some(usage) = &results.cursor {
        let payload = aggregate::cursor_payload(usage);
        outcomes.push((Tool::Cursor, uploader.send(&payload).await));
    }
    if let Some(usage) = &results.claude {
        let payload = aggregate::claude_payload(usage);
        outcomes.push((Tool::Claude, uploader.send(&payload).await));
    }

    for (tool, outcome) in &outcomes {
        match outcome {
            Ok(message) => tracing::info!(tool = tool.id(), %message, "upload accepted"),
            Err(e) => tracing::warn!(tool = tool.id(), error = %e, "upload failed"),
        }
    }
    outcomes
}

#[derive(Debug)]
pub struct CycleReport {
    pub collected_at: DateTime<Utc>,
    pub results: CycleResults,
    pub table: UsageTable,
    /// Empty when running without `--live`.
    pub uploads: Vec<(Tool, Result<String, UploadError>)>,
}

/// One collect, tabulate and (optionally) send pass.
pub async fn run_once(config: &AppConfig, store: &StateStore, uploader: Option<&Uploader>) -> CycleReport {
    let now = Utc::now();
    let results = collect_both(config, store, now).await;
    let table = build_usage_table(results.cursor.as_ref(), results.claude.as_ref());
    let uploads = match uploader {
        Some(uploader) => send_results(uploader, &results).await,
        None => Vec::new(),
    };
    CycleReport {
        collected_at: now,
        results,
        table,
        uploads,
    }
}

/// Clear the Cursor throttle so the first cycle always exports.
pub fn reset_throttle(store: &StateStore) {
    let mut state = store.load();
    state.last_fetch_timestamp = 0.0;
    store.save_or_warn(&state);
}

/// `config.interval()`, or the default five minutes when it is zero.
fn cycle_interval(config: &AppConfig) -> Duration {
    let interval = config.interval();
    if interval.is_zero() {
        tracing::warn!(
            fallback_secs = DEFAULT_CYCLE_INTERVAL.as_secs(),
            "interval_secs is 0, using the default"
        );
        return DEFAULT_CYCLE_INTERVAL;
    }
    interval
}

/// Run cycles every `config.interval()` until `shutdown` is cancelled.
/// `on_cycle` receives each finished cycle for display.
pub async fn run<F>(
    config: &AppConfig,
    store: &StateStore,
    uploader: Option<&Uploader>,
    shutdown: CancellationToken,
    mut on_cycle: F,
) where
    F: FnMut(&CycleReport),
{
    reset_throttle(store);
    let interval = cycle_interval(config);
    let mut cycle = 0u64;

    loop {
        cycle += 1;
        tracing::debug!(cycle, "starting collection cycle");

        let report = tokio::select! {
            _ = shutdown.cancelled() => break,
            report = run_once(config, store, uploader) => report,
        };
        on_cycle(&report);

        tracing::debug!(cycle, wait_secs = interval.as_secs(), "waiting for next cycle");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(cycles = cycle, "collector stopped");
}
