use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

use crate::core::auth::{self, AuthError};
use crate::core::config::AppConfig;
use crate::core::models::usage::{
    BillingPeriodSummary, DateRange, ExportSummary, ModelUsage, ParsedExport, UsageEvent,
};
use crate::core::providers::Tool;

const EXPORT_PATH: &str = "/api/dashboard/export-usage-events-csv";
/// Full-history exports can be large.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);

pub const CSV_COLUMNS: [&str; 10] = [
    "Date",
    "User",
    "Kind",
    "Model",
    "Input (w/ Cache Write)",
    "Input (w/o Cache Write)",
    "Cache Read",
    "Output",
    "Total Tokens",
    "Cost ($)",
];

/// Cost cells meaning "covered by the subscription".
const INCLUDED_COST_SENTINELS: [&str; 3] = ["", "Included", "0"];

#[derive(Error, Debug)]
pub enum CursorError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Unauthorized: invalid Cursor session token")]
    Unauthorized,
    #[error("Forbidden: Cursor token may be expired or lack permissions")]
    Forbidden,
    #[error("Cursor API server error (HTTP {0})")]
    ServerError(u16),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Cursor export request timed out")]
    Timeout,
    #[error("Failed to reach Cursor API: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<reqwest::Error> for CursorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e)
        }
    }
}

// --- Export window ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Full history: from Cursor's first session date (midnight UTC) to now,
/// or the last 365 days when that date is unknown.
pub fn resolve_window(first_session_date: Option<&str>, now: DateTime<Utc>) -> ExportWindow {
    let start = first_session_date
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or_else(|| now - ChronoDuration::days(365));
    ExportWindow { start, end: now }
}

// --- Fetch ---

/// Download the usage CSV for `window`. `session_token` is the cookie value from
/// [`auth::derive_session_token`].
pub async fn fetch_export(
    client: &reqwest::Client,
    base_url: &str,
    session_token: &str,
    window: ExportWindow,
) -> Result<String, CursorError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), EXPORT_PATH);
    let start = window.start.timestamp_millis().to_string();
    let end = window.end.timestamp_millis().to_string();

    tracing::debug!(%url, %start, %end, "requesting Cursor usage export");
    let response = client
        .get(&url)
        .query(&[
            ("startDate", start.as_str()),
            ("endDate", end.as_str()),
            ("showTokenView", "true"),
        ])
        .header("Cookie", format!("WorkosCursorSessionToken={}", session_token))
        .header("Accept", "text/csv,application/csv")
        .send()
        .await?;

    let status = response.status();
    match status.as_u16() {
        401 => return Err(CursorError::Unauthorized),
        403 => return Err(CursorError::Forbidden),
        code @ 500..=599 => return Err(CursorError::ServerError(code)),
        _ => {}
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CursorError::Http {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    Ok(response.text().await?)
}

// --- Parse ---

fn parse_count(raw: &str) -> u64 {
    let raw = raw.trim().trim_matches('"');
    raw.parse::<u64>().unwrap_or_else(|_| match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v as u64,
        _ => 0,
    })
}

/// Returns `(cost, included_in_subscription)`.
fn parse_cost(raw: &str) -> (f64, bool) {
    let raw = raw.trim().trim_matches('"');
    if INCLUDED_COST_SENTINELS.contains(&raw) {
        return (0.0, true);
    }
    let cost = raw.replace('$', "").trim().parse::<f64>().unwrap_or(0.0);
    (cost, false)
}

fn cell(record: &csv::StringRecord, column: Option<usize>) -> &str {
    column
        .and_then(|col| record.get(col))
        .map(|v| v.trim().trim_matches('"'))
        .unwrap_or("")
}

/// Parse the export CSV into events plus a summary.
///
/// Rows may be shorter or longer than the header: extra fields are ignored and
/// missing cells read as empty, so numbers become 0. Records the CSV reader
/// still rejects are skipped and counted in `skipped_rows`.
pub fn parse_export(raw: &str) -> ParsedExport {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "Cursor export has no readable header row");
            return ParsedExport::default();
        }
    };
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let idx: Vec<Option<usize>> = CSV_COLUMNS.iter().map(|c| column(*c)).collect();

    let mut events = Vec::new();
    let mut skipped_rows = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                skipped_rows += 1;
                tracing::debug!(row = line + 1, error = %e, "skipping unreadable export row");
                continue;
            }
        };
        let field = |i: usize| cell(&record, idx[i]);

        let (cost, included_in_subscription) = parse_cost(field(9));
        events.push(UsageEvent {
            date: field(0).to_string(),
            user: field(1).to_string(),
            kind: field(2).to_string(),
            model: field(3).to_string(),
            input_with_cache: parse_count(field(4)),
            input_without_cache: parse_count(field(5)),
            cache_read: parse_count(field(6)),
            output: parse_count(field(7)),
            total_tokens: parse_count(field(8)),
            cost,
            included_in_subscription,
        });
    }

    if skipped_rows > 0 {
        tracing::info!(skipped_rows, "some Cursor export rows could not be read");
    }

    let summary = summarize(&events, skipped_rows);
    ParsedExport { events, summary }
}

fn summarize(events: &[UsageEvent], skipped_rows: usize) -> ExportSummary {
    let models: BTreeSet<&str> = events.iter().map(|e| e.model.as_str()).collect();
    let kinds: BTreeSet<&str> = events
        .iter()
        .map(|e| e.kind.as_str())
        .filter(|k| !k.is_empty())
        .collect();
    ExportSummary {
        total_events: events.len(),
        total_tokens: events
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.total_tokens)),
        total_cost: events.iter().map(|e| e.cost).sum(),
        models_used: models.into_iter().map(str::to_string).collect(),
        kinds: kinds.into_iter().map(str::to_string).collect(),
        date_range: DateRange {
            start: events.first().map(|e| e.date.clone()),
            end: events.last().map(|e| e.date.clone()),
        },
        skipped_rows,
    }
}

// --- Billing periods ---

/// First of the current month (UTC midnight) to `now`.
pub fn current_month_period(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .unwrap_or_else(|| now.date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc();
    (first, now)
}

/// The monthly window, stepped from `anchor`, that contains `now`.
/// Month lengths clamp, so an anchor on the 31st gives e.g. Feb 29.
pub fn billing_period_containing(
    anchor: NaiveDate,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let nth = |n: i32| -> Option<DateTime<Utc>> {
        let date = if n >= 0 {
            anchor.checked_add_months(Months::new(n as u32))?
        } else {
            anchor.checked_sub_months(Months::new(n.unsigned_abs()))?
        };
        Some(date.and_time(NaiveTime::MIN).and_utc())
    };

    let today = now.date_naive();
    let mut n = (today.year() - anchor.year()) * 12 + today.month() as i32
        - anchor.month() as i32;
    if nth(n)? > now {
        n -= 1;
    }
    if nth(n + 1)? <= now {
        n += 1;
    }
    Some((nth(n)?, nth(n + 1)?))
}

/// Totals and per-model breakdown for events in `[period_start, period_end)`.
pub fn compute_billing_summary(
    events: &[UsageEvent],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> BillingPeriodSummary {
    let mut model_usage: BTreeMap<String, ModelUsage> = BTreeMap::new();
    let mut total_requests = 0u64;
    let mut total_tokens = 0u64;
    let mut total_cost = 0.0f64;

    for event in events {
        let Some(at) = event.timestamp() else {
            tracing::debug!(date = %event.date, "skipping event with unparseable date");
            continue;
        };
        if at < period_start || at >= period_end {
            continue;
        }
        total_requests += 1;
        total_tokens = total_tokens.saturating_add(event.total_tokens);
        total_cost += event.cost;

        let entry = model_usage.entry(event.model.clone()).or_default();
        entry.requests += 1;
        entry.tokens = entry.tokens.saturating_add(event.total_tokens);
        entry.cost += event.cost;
    }

    BillingPeriodSummary {
        period_start,
        period_end,
        total_requests,
        total_tokens,
        total_cost,
        model_usage,
        events_count: total_requests as usize,
    }
}

// --- Collection ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorCollectionInfo {
    pub tool: Tool,
    pub data_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_events: usize,
    pub collection_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorMetadata {
    pub data_collection_method: String,
    pub api_endpoint: String,
    pub csv_columns: Vec<String>,
    pub first_session_date: Option<String>,
}

/// Everything one Cursor collection produced.
#[derive(Debug, Clone)]
pub struct CursorUsage {
    pub events: Vec<UsageEvent>,
    pub summary: ExportSummary,
    pub billing_summary: BillingPeriodSummary,
    pub collection_info: CursorCollectionInfo,
    pub metadata: CursorMetadata,
}

/// Read credentials, download the full export and summarise `period`.
///
/// `Ok(None)` means the export was readable but held no events.
pub async fn collect(
    config: &AppConfig,
    period: (DateTime<Utc>, DateTime<Utc>),
    now: DateTime<Utc>,
) -> Result<Option<CursorUsage>, CursorError> {
    let db_path = config.cursor.resolved_db_path();
    let (creds, first_session_date) = tokio::task::spawn_blocking(move || {
        let creds = auth::read_cursor_credentials(&db_path);
        let first = auth::read_first_session_date(&db_path);
        (creds, first)
    })
    .await?;
    let creds = creds?;
    tracing::debug!(account = %creds.account, "found Cursor credentials");

    let session_token = auth::derive_session_token(&creds.access_token)?;
    let window = resolve_window(first_session_date.as_deref(), now);

    let client = reqwest::Client::builder().timeout(EXPORT_TIMEOUT).build()?;
    let raw = fetch_export(&client, &config.cursor.base_url, &session_token, window).await?;

    let parsed = parse_export(&raw);
    if parsed.events.is_empty() {
        tracing::info!("Cursor export contained no usage events");
        return Ok(None);
    }

    let (period_start, period_end) = period;
    let billing_summary = compute_billing_summary(&parsed.events, period_start, period_end);

    let collection_info = CursorCollectionInfo {
        tool: Tool::Cursor,
        data_type: "month_to_date_csv".to_string(),
        period_start,
        period_end,
        total_events: parsed.events.len(),
        collection_method: "csv_export_api".to_string(),
    };
    let metadata = CursorMetadata {
        data_collection_method: "cursor_csv_export".to_string(),
        api_endpoint: EXPORT_PATH.to_string(),
        csv_columns: CSV_COLUMNS.iter().map(|c| c.to_string()).collect(),
        first_session_date,
    };

    tracing::info!(
        events = parsed.summary.total_events,
        tokens = parsed.summary.total_tokens,
        skipped = parsed.summary.skipped_rows,
        "collected Cursor usage"
    );

    Ok(Some(CursorUsage {
        events: parsed.events,
        summary: parsed.summary,
        billing_summary,
        collection_info,
        metadata,
    }))
}
