//! Business calendar
//!
//! Accounting dates, due dates and the two-digit year in document numbers are
//! reckoned in the Europe/Paris timezone, whatever the server clock says.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Europe::Paris;

/// Converts an instant to the business date
pub fn business_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Paris).date_naive()
}

/// Today's business date
pub fn business_today() -> NaiveDate {
    business_date(Utc::now())
}
