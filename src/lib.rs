//! LoRaWAN network server MAC command engine
//!
//! Keeps the radio parameters the network wants a device to use (desired) in
//! step with the ones the device acknowledged (current), one MAC command
//! exchange at a time:
//!
//! - [`mac::uplink::handle_uplink`] applies the answers of an uplink
//! - [`mac::downlink::enqueue_downlink`] selects the requests of the next
//!   downlink within its byte budget
//!
//! Band tables live in [`band`], Class B and duty cycle timing in [`timing`],
//! and [`sim`] drives the engine against simulated devices.

pub mod band;
pub mod config;
pub mod error;
pub mod frequency_plan;
pub mod lorawan;
pub mod mac;
pub mod sim;
pub mod timing;

pub use error::{MacError, Result};
