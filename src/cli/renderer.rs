use chrono::{DateTime, Utc};
use colored::{control, ColoredString, Colorize};

use crate::core::collector::{CycleReport, UsageTable};
use crate::core::formatter::{
    format_clock, format_cost, format_countdown, format_period, format_token_count, format_tokens,
};
use crate::core::models::ccusage::MonthlyReport;
use crate::core::models::usage::BillingPeriodSummary;
use crate::core::providers::Tool;
use crate::core::upload::UploadError;

const RULE_WIDTH: usize = 80;

fn tool_label(tool: Tool) -> ColoredString {
    match tool {
        Tool::Cursor => tool.display_name().blue(),
        Tool::Claude => tool.display_name().magenta(),
    }
}

/// Render the per-model usage table.
///
/// Layout:
/// ```text
/// Tool         Model                                  Tokens       Cost
/// --------------------------------------------------------------------------------
/// Cursor       gpt-4                                     150    $0.5000
/// Claude       claude-sonnet-4-20250514               20,000    $0.7500
/// --------------------------------------------------------------------------------
/// TOTAL                                               20,150    $1.2500
/// ```
pub fn render_usage_table(table: &UsageTable, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(
        format!("{:<12} {:<30} {:>22} {:>10}", "Tool", "Model", "Tokens", "Cost")
            .bold()
            .to_string(),
    );
    lines.push("-".repeat(RULE_WIDTH));

    if table.rows.is_empty() {
        lines.push("  No usage data collected".dimmed().to_string());
    }
    for row in &table.rows {
        // Pad before coloring so ANSI codes don't break alignment.
        let label = format!("{:<12}", row.tool.display_name());
        let label = match row.tool {
            Tool::Cursor => label.blue(),
            Tool::Claude => label.magenta(),
        };
        lines.push(format!(
            "{} {:<30} {:>22} {:>10}",
            label,
            row.model,
            format_token_count(row.tokens),
            format_cost(row.cost)
        ));
    }

    lines.push("-".repeat(RULE_WIDTH));
    lines.push(
        format!(
            "{:<12} {:<30} {:>22} {:>10}",
            "TOTAL",
            "",
            format_token_count(table.total_tokens),
            format_cost(table.total_cost)
        )
        .bold()
        .to_string(),
    );

    lines.join("\n")
}

pub fn render_billing_summary(summary: &BillingPeriodSummary, use_color: bool) -> String {
    control::set_override(use_color);
    format!(
        "  {}  {}  ({} requests, {} tokens, {})",
        "Cursor period".cyan(),
        format_period(&summary.period_start, &summary.period_end),
        summary.total_requests,
        format_tokens(summary.total_tokens),
        format_cost(summary.total_cost)
    )
}

fn render_upload(tool: Tool, outcome: &Result<String, UploadError>) -> String {
    match outcome {
        Ok(message) => format!("  {} {} {}", "✓".green(), tool_label(tool), message),
        Err(e) => format!("  {} {} {}", "✗".red(), tool_label(tool), e.to_string().red()),
    }
}

/// Full block for one collection cycle.
pub fn render_cycle(report: &CycleReport, next_at: Option<&DateTime<Utc>>, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(
        format!(" AI usage at {}", format_clock(&report.collected_at))
            .bold()
            .to_string(),
    );

    if let Some(cursor) = &report.results.cursor {
        lines.push(render_billing_summary(&cursor.billing_summary, use_color));
        if cursor.summary.skipped_rows > 0 {
            lines.push(
                format!("  {} export rows could not be read", cursor.summary.skipped_rows)
                    .yellow()
                    .to_string(),
            );
        }
    }
    for (tool, available) in [
        (Tool::Cursor, report.results.cursor.is_some()),
        (Tool::Claude, report.results.claude.is_some()),
    ] {
        if !available {
            lines.push(format!("  {} {}", tool_label(tool), "no data this cycle".dimmed()));
        }
    }

    lines.push(String::new());
    lines.push(render_usage_table(&report.table, use_color));

    if !report.uploads.is_empty() {
        lines.push(String::new());
        for (tool, outcome) in &report.uploads {
            lines.push(render_upload(*tool, outcome));
        }
    }

    if let Some(next_at) = next_at {
        lines.push(String::new());
        lines.push(
            format_countdown(next_at, &report.collected_at)
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Month-by-month ccusage history with per-model lines.
pub fn render_monthly(report: &MonthlyReport, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(" {}", "Claude Code monthly usage".bold()));

    if report.monthly.is_empty() {
        lines.push("  No usage recorded".dimmed().to_string());
    }
    for month in &report.monthly {
        lines.push(format!(
            "  {}  {:>16} tokens  {:>12}",
            format!("{:<8}", month.month).cyan(),
            format_token_count(month.total_tokens),
            format_cost(month.total_cost)
        ));
        for b in &month.model_breakdowns {
            lines.push(format!(
                "    {:<34} {} in / {} out  {}",
                b.model_name.as_deref().unwrap_or("unknown"),
                format_tokens(b.input_tokens),
                format_tokens(b.output_tokens),
                format_cost(b.cost)
            ));
        }
    }

    if let Some(totals) = &report.totals {
        lines.push(format!(
            "  {}  {:>16} tokens  {:>12}",
            format!("{:<8}", "Total").bold(),
            format_token_count(totals.total_tokens),
            format_cost(totals.total_cost)
        ));
    }

    lines.join("\n")
}
