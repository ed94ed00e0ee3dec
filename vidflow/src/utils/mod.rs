//! Small shared helpers.

pub mod timestamps;

pub use timestamps::{is_older_than, iso_timestamp, now_utc, Timestamp};
