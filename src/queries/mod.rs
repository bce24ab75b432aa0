//! Typed data access. Every join the views need is projected into a plain
//! struct here, so handlers never deal with nested relation shapes.

pub mod announcements;
pub mod clubs;
pub mod events;
pub mod memberships;
pub mod profiles;
pub mod registrations;

use chrono::{NaiveDate, Utc};

pub fn today() -> NaiveDate {
    Utc::now().naive_utc().date()
}
