//! Timing helpers: GPS time, Class B ping slots, airtime

pub mod airtime;
pub mod class_b;
pub mod gps;

pub use airtime::{backoff_until, time_on_air};
pub use class_b::{beacon_time_before, next_ping_slot_at, periodic_frequency, ping_offset};
