use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::core::models::aggregate::{
    AggregateKey, ClaudeMetrics, CursorMetrics, DailyAggregate, Metrics, UploadPayload,
};
use crate::core::models::ccusage::DailyReport;
use crate::core::models::usage::UsageEvent;
use crate::core::providers::claude::{ClaudeCollectionInfo, ClaudeMetadata, ClaudeUsage};
use crate::core::providers::cursor::{CursorCollectionInfo, CursorMetadata, CursorUsage};
use crate::core::providers::Tool;

const UNKNOWN_MODEL: &str = "unknown";

/// Calendar date of an export timestamp.
///
/// Offsets are kept, so `2024-01-01T23:30:00-05:00` is still Jan 1st.
/// Falls back to the text before the first `T` when the value is not a timestamp.
pub fn date_part(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive().format("%Y-%m-%d").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.date().format("%Y-%m-%d").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%Y-%m-%d").to_string();
    }
    raw.split('T').next().unwrap_or(raw).to_string()
}

/// Fold records with equal keys. Output is sorted by key.
pub fn merge_aggregates<I>(aggregates: I) -> Vec<DailyAggregate>
where
    I: IntoIterator<Item = DailyAggregate>,
{
    let mut merged: BTreeMap<AggregateKey, DailyAggregate> = BTreeMap::new();
    for agg in aggregates {
        match merged.entry(agg.key()) {
            Entry::Occupied(mut slot) => slot.get_mut().metrics.absorb(&agg.metrics),
            Entry::Vacant(slot) => {
                slot.insert(agg);
            }
        }
    }
    merged.into_values().collect()
}

/// One record per `(date, model, kind, included_in_subscription)`.
pub fn aggregate_cursor(events: &[UsageEvent]) -> Vec<DailyAggregate> {
    merge_aggregates(events.iter().map(|event| DailyAggregate {
        date: date_part(&event.date),
        model: event.model.clone(),
        kind: Some(event.kind.clone()),
        included_in_subscription: Some(event.included_in_subscription),
        metrics: Metrics::Cursor(CursorMetrics {
            input_with_cache: event.input_with_cache,
            input_without_cache: event.input_without_cache,
            cache_read: event.cache_read,
            output: event.output,
            total_tokens: event.total_tokens,
            cost: event.cost,
            requests: 1,
        }),
    }))
}

/// One record per `(date, model)` from the per-day model breakdowns.
pub fn aggregate_claude(report: &DailyReport) -> Vec<DailyAggregate> {
    let records = report.daily.iter().flat_map(|day| {
        day.model_breakdowns.iter().map(move |b| DailyAggregate {
            date: date_part(&day.date),
            model: b
                .model_name
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            kind: None,
            included_in_subscription: None,
            metrics: Metrics::Claude(ClaudeMetrics {
                input_tokens: b.input_tokens,
                output_tokens: b.output_tokens,
                cache_creation_tokens: b.cache_creation_tokens,
                cache_read_tokens: b.cache_read_tokens,
                total_tokens: b.total_tokens(),
                cost: b.cost,
                requests: 1,
            }),
        })
    });
    merge_aggregates(records)
}

pub fn cursor_payload(usage: &CursorUsage) -> UploadPayload<CursorCollectionInfo, CursorMetadata> {
    UploadPayload {
        tool: Tool::Cursor,
        daily_aggregates: aggregate_cursor(&usage.events),
        collection_info: usage.collection_info.clone(),
        metadata: usage.metadata.clone(),
        totals: None,
    }
}

pub fn claude_payload(usage: &ClaudeUsage) -> UploadPayload<ClaudeCollectionInfo, ClaudeMetadata> {
    UploadPayload {
        tool: Tool::Claude,
        daily_aggregates: aggregate_claude(&usage.report),
        collection_info: usage.collection_info.clone(),
        metadata: usage.metadata.clone(),
        totals: usage.report.totals.clone(),
    }
}
