use time::macros::format_description;
use time::OffsetDateTime;

/// Short relative age: `now`, `5m`, `3h`, `2d`, then a calendar date such as `Mar 4`.
pub fn time_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let elapsed = now - then;
    let minutes = elapsed.whole_minutes();
    let hours = elapsed.whole_hours();
    let days = elapsed.whole_days();

    if minutes < 1 {
        "now".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else if hours < 24 {
        format!("{}h", hours)
    } else if days < 7 {
        format!("{}d", days)
    } else {
        then.format(format_description!("[month repr:short] [day padding:none]"))
            .unwrap_or_else(|_| then.date().to_string())
    }
}

/// Compact counter: `999`, `1.2K`, `3.4M`.
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Avatar placeholder when a user has no profile image.
pub fn initials(name: &str) -> String {
    name.chars()
        .next()
        .map(|first| first.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}
