//! Date formatting helpers for display.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

fn plural(n: i64, unit: &str) -> String {
  if n == 1 {
    format!("1 {}", unit)
  } else {
    format!("{} {}s", n, unit)
  }
}

/// Describe `then` relative to `now`, e.g. "5 minutes ago" or "in 2 days".
pub fn relative_to(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let delta = now - then;
  let future = delta.num_seconds() < 0;
  let delta = if future { -delta } else { delta };

  let minutes = delta.num_minutes();
  if minutes < 1 {
    return "just now".to_string();
  }

  let hours = delta.num_hours();
  let days = delta.num_days();
  let amount = if minutes < 60 {
    plural(minutes, "minute")
  } else if hours < 24 {
    plural(hours, "hour")
  } else if days == 1 {
    return if future { "tomorrow" } else { "yesterday" }.to_string();
  } else {
    plural(days, "day")
  };

  if future {
    format!("in {}", amount)
  } else {
    format!("{} ago", amount)
  }
}

/// Label for a menu day: "today", "tomorrow", the weekday within the coming
/// week, a short date otherwise.
pub fn menu_day_label(date: NaiveDate, today: NaiveDate) -> String {
  match (date - today).num_days() {
    0 => "today".to_string(),
    1 => "tomorrow".to_string(),
    -1 => "yesterday".to_string(),
    2..=6 => weekday_name(date).to_string(),
    _ => date.format("%a %-d %b").to_string(),
  }
}

fn weekday_name(date: NaiveDate) -> &'static str {
  match date.weekday() {
    chrono::Weekday::Mon => "Monday",
    chrono::Weekday::Tue => "Tuesday",
    chrono::Weekday::Wed => "Wednesday",
    chrono::Weekday::Thu => "Thursday",
    chrono::Weekday::Fri => "Friday",
    chrono::Weekday::Sat => "Saturday",
    chrono::Weekday::Sun => "Sunday",
  }
}

/// Publication timestamp as shown above an article.
pub fn article_timestamp(at: DateTime<Utc>) -> String {
  at.format("%d %b %Y %H:%M").to_string()
}
