use serde::{Deserialize, Serialize};

use crate::core::models::ccusage::Totals;
use crate::core::providers::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorMetrics {
    pub input_with_cache: u64,
    pub input_without_cache: u64,
    pub cache_read: u64,
    pub output: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaudeMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

/// Additive metric bundle; the variant follows the source the record came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metrics {
    Cursor(CursorMetrics),
    Claude(ClaudeMetrics),
}

impl Metrics {
    pub fn tool(&self) -> Tool {
        match self {
            Self::Cursor(_) => Tool::Cursor,
            Self::Claude(_) => Tool::Claude,
        }
    }

    /// Add `other` into `self`. Bundles from different sources are never merged
    /// because their aggregate keys differ.
    pub fn absorb(&mut self, other: &Metrics) {
        match (self, other) {
            (Self::Cursor(a), Self::Cursor(b)) => {
                a.input_with_cache = a.input_with_cache.saturating_add(b.input_with_cache);
                a.input_without_cache = a.input_without_cache.saturating_add(b.input_without_cache);
                a.cache_read = a.cache_read.saturating_add(b.cache_read);
                a.output = a.output.saturating_add(b.output);
                a.total_tokens = a.total_tokens.saturating_add(b.total_tokens);
                a.cost += b.cost;
                a.requests = a.requests.saturating_add(b.requests);
            }
            (Self::Claude(a), Self::Claude(b)) => {
                a.input_tokens = a.input_tokens.saturating_add(b.input_tokens);
                a.output_tokens = a.output_tokens.saturating_add(b.output_tokens);
                a.cache_creation_tokens = a.cache_creation_tokens.saturating_add(b.cache_creation_tokens);
                a.cache_read_tokens = a.cache_read_tokens.saturating_add(b.cache_read_tokens);
                a.total_tokens = a.total_tokens.saturating_add(b.total_tokens);
                a.cost += b.cost;
                a.requests = a.requests.saturating_add(b.requests);
            }
            (this, other) => {
                tracing::warn!(
                    into = this.tool().id(),
                    from = other.tool().id(),
                    "refusing to merge metrics from different sources"
                );
            }
        }
    }
}

#[cfg(test)]
impl Metrics {
    pub fn total_tokens(&self) -> u64 {
        match self {
            Self::Cursor(m) => m.total_tokens,
            Self::Claude(m) => m.total_tokens,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            Self::Cursor(m) => m.cost,
            Self::Claude(m) => m.cost,
        }
    }

    pub fn requests(&self) -> u64 {
        match self {
            Self::Cursor(m) => m.requests,
            Self::Claude(m) => m.requests,
        }
    }
}

/// Grouping key: `(tool, date, model, kind, included_in_subscription)`.
pub type AggregateKey = (Tool, String, String, Option<String>, Option<bool>);

/// Canonical per-day, per-model usage record sent to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    /// `YYYY-MM-DD`
    pub date: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_in_subscription: Option<bool>,
    #[serde(flatten)]
    pub metrics: Metrics,
}

impl DailyAggregate {
    pub fn key(&self) -> AggregateKey {
        (
            self.metrics.tool(),
            self.date.clone(),
            self.model.clone(),
            self.kind.clone(),
            self.included_in_subscription,
        )
    }
}

/// Body of `POST /api/usage/collect/`.
///
/// `collection_info` and `metadata` are source-specific and passed through untouched.
#[derive(Debug, Clone, Serialize)]
pub struct UploadPayload<I, M> {
    pub tool: Tool,
    pub daily_aggregates: Vec<DailyAggregate>,
    pub collection_info: I,
    pub metadata: M,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
}
