use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the Cursor usage export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Timestamp exactly as the export reported it
    pub date: String,
    pub user: String,
    pub kind: String,
    pub model: String,
    pub input_with_cache: u64,
    pub input_without_cache: u64,
    pub cache_read: u64,
    pub output: u64,
    /// As reported; not necessarily the sum of the token columns
    pub total_tokens: u64,
    /// Dollars, 0.0 when included in the subscription
    pub cost: f64,
    pub included_in_subscription: bool,
}

impl UsageEvent {
    /// Parse `date` as an instant. Accepts RFC 3339 and naive ISO timestamps (read as UTC).
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub total_events: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub models_used: Vec<String>,
    pub kinds: Vec<String>,
    /// First and last row in export order, which is not guaranteed chronological
    pub date_range: DateRange,
    /// Records dropped because they could not be read
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedExport {
    pub events: Vec<UsageEvent>,
    pub summary: ExportSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriodSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub model_usage: BTreeMap<String, ModelUsage>,
    pub events_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_at(date: &str) -> UsageEvent {
        UsageEvent {
            date: date.to_string(),
            user: String::new(),
            kind: String::new(),
            model: "m".to_string(),
            input_with_cache: 0,
            input_without_cache: 0,
            cache_read: 0,
            output: 0,
            total_tokens: 0,
            cost: 0.0,
            included_in_subscription: true,
        }
    }

    #[test]
    fn timestamp_parses_zulu() {
        let ts = event_at("2024-01-01T10:00:00Z").timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-01T10:00:00+00:00");
    }

    #[test]
    fn timestamp_converts_offset_to_utc() {
        let ts = event_at("2024-01-01T01:00:00+02:00").timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-12-31T23:00:00+00:00");
    }

    #[test]
    fn timestamp_accepts_naive_with_millis() {
        assert!(event_at("2024-01-01T10:00:00.123").timestamp().is_some());
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!(event_at("yesterday").timestamp().is_none());
    }
}
