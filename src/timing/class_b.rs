//! Class B beacon and ping slot timing
//!
//! All functions are pure functions of GPS time and the device address, so
//! every network server instance computes the same slots.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use chrono::{DateTime, Duration, Utc};

use super::gps::{from_gps, to_gps};
use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::DevAddr;

/// Seconds between two beacons
pub const BEACON_PERIOD_SECS: i64 = 128;
/// Beacon reserved time at the start of a beacon period
pub const BEACON_RESERVED_MS: i64 = 2_120;
pub const PING_SLOT_LEN_MS: i64 = 30;
/// Largest ping slot periodicity exponent
pub const MAX_PERIODICITY: u8 = 7;

/// GPS time of the last beacon at or before `t`
pub fn beacon_time_before(t: DateTime<Utc>) -> Duration {
    let secs = to_gps(t).num_seconds();
    Duration::seconds(secs - secs.rem_euclid(BEACON_PERIOD_SECS))
}

/// Slots between two ping slots of a device
pub fn ping_period(periodicity: u8) -> u32 {
    1 << (5 + periodicity.min(MAX_PERIODICITY))
}

/// Pseudo-random offset of the first ping slot in a beacon period
pub fn ping_offset(beacon_time: Duration, dev_addr: DevAddr, ping_period: u32) -> u32 {
    let cipher = Aes128::new(&GenericArray::from([0u8; 16]));
    let mut block = [0u8; 16];
    block[..4].copy_from_slice(&(beacon_time.num_seconds() as u32).to_le_bytes());
    block[4..8].copy_from_slice(&dev_addr.to_le_bytes());
    let mut block = GenericArray::from(block);
    cipher.encrypt_block(&mut block);
    let rand = block[0] as u32 + 256 * block[1] as u32;
    rand % ping_period
}

/// First ping slot of the device starting at or after `earliest`
pub fn next_ping_slot_at(
    dev_addr: DevAddr,
    periodicity: u8,
    earliest: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if periodicity > MAX_PERIODICITY {
        return Err(MacError::InvalidPayload(format!(
            "ping slot periodicity {} out of range",
            periodicity
        )));
    }
    let period = ping_period(periodicity);
    let ping_nb = 1u32 << (MAX_PERIODICITY - periodicity);

    let mut beacon = beacon_time_before(earliest);
    // The first slot of the following beacon period always qualifies
    loop {
        let offset = ping_offset(beacon, dev_addr, period);
        for i in 0..ping_nb {
            let slot = (offset + i * period) as i64;
            let at = from_gps(
                beacon
                    + Duration::milliseconds(BEACON_RESERVED_MS + slot * PING_SLOT_LEN_MS),
            );
            if at >= earliest {
                return Ok(at);
            }
        }
        beacon = beacon + Duration::seconds(BEACON_PERIOD_SECS);
    }
}

/// Channel of a hopping periodic transmission in the given beacon period
///
/// Beacons hop with `dev_addr` 0, ping slots with the device address.
pub fn periodic_frequency(frequencies: &[u64], beacon_time: Duration, dev_addr: u32) -> Option<u64> {
    if frequencies.is_empty() {
        return None;
    }
    let period = (beacon_time.num_seconds() / BEACON_PERIOD_SECS) as u64;
    let index = (period + dev_addr as u64) % frequencies.len() as u64;
    frequencies.get(index as usize).copied()
}

/// Beacon frequency at `beacon_time`; `fixed` is used when non-zero
pub fn beacon_frequency(phy: &Band, fixed: u64, beacon_time: Duration) -> Option<u64> {
    if fixed != 0 {
        return Some(fixed);
    }
    periodic_frequency(phy.beacon.frequencies, beacon_time, 0)
}

/// Ping slot frequency at `beacon_time`; `fixed` is used when non-zero
pub fn ping_slot_frequency(
    phy: &Band,
    fixed: u64,
    dev_addr: DevAddr,
    beacon_time: Duration,
) -> Option<u64> {
    if fixed != 0 {
        return Some(fixed);
    }
    periodic_frequency(phy.ping_slot_frequencies, beacon_time, dev_addr.0)
}
