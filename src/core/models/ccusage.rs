use serde::{Deserialize, Serialize};

// ccusage emits camelCase JSON and omits fields freely between versions, so
// every field defaults instead of failing the whole report.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelBreakdown {
    pub model_name: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    pub cost: f64,
}

impl ModelBreakdown {
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.unwrap_or_else(|| {
            self.input_tokens
                .saturating_add(self.output_tokens)
                .saturating_add(self.cache_creation_tokens)
                .saturating_add(self.cache_read_tokens)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyEntry {
    pub date: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub models_used: Vec<String>,
    pub model_breakdowns: Vec<ModelBreakdown>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Totals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Output of `ccusage daily --json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyReport {
    pub daily: Vec<DailyEntry>,
    pub totals: Option<Totals>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonthlyEntry {
    pub month: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub model_breakdowns: Vec<ModelBreakdown>,
}

/// Output of `ccusage monthly --json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyReport {
    pub monthly: Vec<MonthlyEntry>,
    pub totals: Option<Totals>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_daily_report() {
        let json = r#"{
            "daily": [{
                "date": "2024-01-01",
                "inputTokens": 10, "outputTokens": 5,
                "cacheCreationTokens": 2, "cacheReadTokens": 100,
                "totalTokens": 117, "totalCost": 0.5,
                "modelsUsed": ["claude-sonnet-4-20250514"],
                "modelBreakdowns": [{
                    "modelName": "claude-sonnet-4-20250514",
                    "inputTokens": 10, "outputTokens": 5,
                    "cacheCreationTokens": 2, "cacheReadTokens": 100,
                    "cost": 0.5
                }]
            }],
            "totals": {"inputTokens": 10, "outputTokens": 5, "totalTokens": 117, "totalCost": 0.5}
        }"#;
        let report: DailyReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.daily.len(), 1);
        let breakdown = &report.daily[0].model_breakdowns[0];
        assert_eq!(breakdown.model_name.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(breakdown.total_tokens(), 117);
        let totals = report.totals.unwrap();
        assert_eq!(totals.total_tokens, 117);
        assert_eq!(totals.cache_read_tokens, 0);
    }

    #[test]
    fn deserialize_empty_object() {
        let report: DailyReport = serde_json::from_str("{}").unwrap();
        assert!(report.daily.is_empty());
        assert!(report.totals.is_none());
    }

    #[test]
    fn breakdown_prefers_reported_total() {
        let breakdown = ModelBreakdown {
            input_tokens: 1,
            output_tokens: 1,
            total_tokens: Some(50),
            ..Default::default()
        };
        assert_eq!(breakdown.total_tokens(), 50);
    }

    #[test]
    fn breakdown_computed_total_saturates() {
        let breakdown = ModelBreakdown {
            input_tokens: u64::MAX,
            output_tokens: 5,
            ..Default::default()
        };
        assert_eq!(breakdown.total_tokens(), u64::MAX);
    }

    #[test]
    fn deserialize_monthly_report() {
        let json = r#"{"monthly":[{"month":"2024-01","totalTokens":42,"totalCost":1.25}]}"#;
        let report: MonthlyReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.monthly[0].month, "2024-01");
        assert_eq!(report.monthly[0].total_tokens, 42);
        assert!(report.monthly[0].model_breakdowns.is_empty());
    }
}
