use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// `issued_at + expires_in - safety_margin`, `None` when out of range.
pub fn outdated_at(
    issued_at: DateTime<Utc>,
    expires_in_seconds: u64,
    safety_margin_seconds: u64,
) -> Option<DateTime<Utc>> {
    let expires_in = TimeDelta::try_seconds(i64::try_from(expires_in_seconds).ok()?)?;
    let margin = TimeDelta::try_seconds(i64::try_from(safety_margin_seconds).ok()?)?;
    issued_at
        .checked_add_signed(expires_in)?
        .checked_sub_signed(margin)
}

/// Time left until `at`, zero if it already passed.
pub fn delay_until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

pub fn get_instant() -> Instant {
    Instant::now()
}
