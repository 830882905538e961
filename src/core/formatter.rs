use chrono::{DateTime, Local, Utc};

/// Compact token count: "950", "12.3K", "4.1M".
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{}", count)
    }
}

/// Full token count with thousands separators: "1,234,567".
pub fn format_token_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Dollar amount with four decimals, matching ccusage precision.
pub fn format_cost(cost: f64) -> String {
    format!("${:.4}", cost)
}

/// "Mar 01 to Mar 17" in local time.
pub fn format_period(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    format!(
        "{} to {}",
        start.with_timezone(&Local).format("%b %d"),
        end.with_timezone(&Local).format("%b %d, %Y")
    )
}

/// "Next collection in Xh Ym" relative to `now`.
pub fn format_countdown(target: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let total_seconds = (*target - *now).num_seconds();

    if total_seconds <= 0 {
        return "Next collection now".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours > 0 {
        format!("Next collection in {}h {}m", hours, minutes)
    } else if total_minutes > 0 {
        format!("Next collection in {}m", total_minutes)
    } else {
        format!("Next collection in {}s", total_seconds)
    }
}

/// Local wall-clock time of a collection, e.g. "14:05:09".
pub fn format_clock(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
