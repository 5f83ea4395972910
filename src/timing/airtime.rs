//! Time on air and duty cycle back-off

use chrono::{DateTime, Duration, Utc};

use crate::band::{Band, DataRate, Modulation};

/// LoRa preamble symbols used by LoRaWAN
const LORA_PREAMBLE_SYMBOLS: f64 = 8.0;
/// Coding rate 4/5
const LORA_CODING_RATE: f64 = 1.0;
/// FSK preamble, sync word, length byte and CRC
const FSK_OVERHEAD_BYTES: u32 = 5 + 3 + 1 + 2;

/// Transmission time of a PHY payload of `payload_len` bytes
pub fn time_on_air(dr: &DataRate, payload_len: u16) -> Duration {
    let seconds = match dr.modulation {
        Modulation::Lora {
            spreading_factor,
            bandwidth,
        } => {
            let sf = spreading_factor as f64;
            let t_sym = 2f64.powi(spreading_factor as i32) / bandwidth as f64;
            let low_dr_optimize = if t_sym > 0.016 { 1.0 } else { 0.0 };
            // Explicit header, CRC on
            let numerator = 8.0 * payload_len as f64 - 4.0 * sf + 28.0 + 16.0;
            let denominator = 4.0 * (sf - 2.0 * low_dr_optimize);
            let payload_symbols =
                8.0 + ((numerator / denominator).ceil() * (LORA_CODING_RATE + 4.0)).max(0.0);
            (LORA_PREAMBLE_SYMBOLS + 4.25 + payload_symbols) * t_sym
        }
        Modulation::Fsk { bit_rate } => {
            (8 * (FSK_OVERHEAD_BYTES + payload_len as u32)) as f64 / bit_rate as f64
        }
    };
    Duration::microseconds((seconds * 1e6).round() as i64)
}

/// Earliest instant the device may transmit again after `sent_at`
///
/// The stricter of the aggregated duty cycle (1 / 2^`max_duty_cycle`) and the
/// regulatory limit of the sub-band containing `frequency` applies.
pub fn backoff_until(
    phy: &Band,
    frequency: u64,
    max_duty_cycle: u8,
    sent_at: DateTime<Utc>,
    airtime: Duration,
) -> DateTime<Utc> {
    let aggregated = 1.0 / 2f64.powi(max_duty_cycle.min(15) as i32);
    let duty = phy
        .sub_band_duty_cycle(frequency)
        .map_or(aggregated, |limit| aggregated.min(limit as f64));
    let airtime_us = airtime.num_microseconds().unwrap_or(i64::MAX) as f64;
    sent_at + Duration::microseconds((airtime_us / duty).round() as i64)
}
