use chrono::{Datelike, NaiveDate};
use tracing::warn;

use crate::db::DataSource;

/// Day of week on a 1..=7 scale with Monday = 1 and Sunday = 7.
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().number_from_monday() as u8
}

pub fn is_weekend(date: NaiveDate) -> bool {
    weekday_number(date) >= 6
}

/// Gate run before any class-status work: weekends and holidays are not
/// teaching days. A failed holiday lookup degrades to "not a holiday" so the
/// dashboard still renders.
pub async fn is_teaching_day(source: &dyn DataSource, date: NaiveDate) -> bool {
    if is_weekend(date) {
        return false;
    }
    match source.holiday_exists(date).await {
        Ok(is_holiday) => !is_holiday,
        Err(err) => {
            warn!(%date, error = %err, "holiday lookup failed, assuming teaching day");
            true
        }
    }
}
