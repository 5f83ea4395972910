//! Regional band descriptions
//!
//! A [`Band`] is a read-only description of a LoRaWAN region: default
//! channels, data rates, power steps, RX1 data rate mapping, Class B
//! parameters and how channel masks are encoded. Bands are `static` and
//! shared between all devices.

pub mod as923;
pub mod channel_mask;
pub mod eu868;
pub mod us915;

use crate::error::Result;

pub use channel_mask::{ChMaskPair, ChannelMask, MaskScheme};

/// Maximum EIRP values (dBm) indexed by the TxParamSetupReq MaxEIRP field
pub const MAX_EIRP_TABLE: [f32; 16] = [
    8.0, 10.0, 12.0, 13.0, 14.0, 16.0, 18.0, 20.0, 21.0, 24.0, 26.0, 27.0, 29.0, 30.0, 33.0, 36.0,
];

/// Radio modulation of a data rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modulation {
    Lora {
        spreading_factor: u8,
        /// Hz
        bandwidth: u32,
    },
    Fsk {
        /// bit/s
        bit_rate: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRate {
    pub modulation: Modulation,
    pub max_mac_payload_size: u16,
    pub max_mac_payload_size_with_dwell_time: u16,
}

impl DataRate {
    pub const fn lora(spreading_factor: u8, bandwidth: u32, max: u16, max_dwell: u16) -> Self {
        Self {
            modulation: Modulation::Lora {
                spreading_factor,
                bandwidth,
            },
            max_mac_payload_size: max,
            max_mac_payload_size_with_dwell_time: max_dwell,
        }
    }

    pub const fn fsk(bit_rate: u32, max: u16, max_dwell: u16) -> Self {
        Self {
            modulation: Modulation::Fsk { bit_rate },
            max_mac_payload_size: max,
            max_mac_payload_size_with_dwell_time: max_dwell,
        }
    }

    pub fn max_mac_payload(&self, dwell_time: bool) -> u16 {
        if dwell_time {
            self.max_mac_payload_size_with_dwell_time
        } else {
            self.max_mac_payload_size
        }
    }

    /// Demodulation floor in dB; `None` for FSK
    pub fn required_snr(&self) -> Option<f32> {
        match self.modulation {
            Modulation::Lora {
                spreading_factor, ..
            } => Some(match spreading_factor {
                5 => -2.5,
                6 => -5.0,
                7 => -7.5,
                8 => -10.0,
                9 => -12.5,
                10 => -15.0,
                11 => -17.5,
                _ => -20.0,
            }),
            Modulation::Fsk { .. } => None,
        }
    }
}

/// A default channel of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandChannel {
    pub frequency: u64,
    pub min_data_rate_index: u8,
    pub max_data_rate_index: u8,
}

impl BandChannel {
    pub const fn new(frequency: u64, min_data_rate_index: u8, max_data_rate_index: u8) -> Self {
        Self {
            frequency,
            min_data_rate_index,
            max_data_rate_index,
        }
    }
}

/// Regulatory sub-band with its duty cycle limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubBand {
    pub min_frequency: u64,
    pub max_frequency: u64,
    pub duty_cycle: f32,
}

/// How the CFList of a Join Accept is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfListType {
    /// Up to five extra channel frequencies
    Frequencies,
    /// Channel mask bits for fixed channel plans
    ChannelMasks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rx2Parameters {
    pub data_rate_index: u8,
    pub frequency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeaconParameters {
    pub data_rate_index: u8,
    /// Beacon channels; more than one means the beacon hops
    pub frequencies: &'static [u64],
}

/// RX1 data rate for an uplink data rate, RX1 offset and downlink dwell time
pub type Rx1DataRateFn = fn(u8, u8, bool) -> Option<u8>;

#[derive(Debug, Clone)]
pub struct Band {
    pub id: &'static str,
    pub uplink_channels: &'static [BandChannel],
    pub max_uplink_channels: usize,
    pub downlink_channels: &'static [BandChannel],
    pub max_downlink_channels: usize,
    pub sub_bands: &'static [SubBand],
    pub data_rates: &'static [Option<DataRate>; 16],
    /// Highest data rate ADR may select
    pub max_adr_data_rate_index: u8,
    pub supports_dynamic_adr: bool,
    /// dB below max EIRP, indexed by Tx power index
    pub tx_offsets: &'static [f32],
    pub default_max_eirp: f32,
    pub rx1_data_rate: Rx1DataRateFn,
    pub max_rx1_data_rate_offset: u8,
    pub default_rx2: Rx2Parameters,
    pub beacon: BeaconParameters,
    pub ping_slot_frequencies: &'static [u64],
    pub default_ping_slot_data_rate_index: u8,
    pub cf_list_type: CfListType,
    pub tx_param_setup_req_support: bool,
    pub boot_uplink_dwell_time: bool,
    pub boot_downlink_dwell_time: bool,
    pub mask_scheme: MaskScheme,
}

impl Band {
    pub fn data_rate(&self, index: u8) -> Option<&DataRate> {
        self.data_rates.get(index as usize).and_then(|dr| dr.as_ref())
    }

    pub fn max_tx_power_index(&self) -> u8 {
        self.tx_offsets.len().saturating_sub(1) as u8
    }

    /// Data rate indexes this band defines
    pub fn data_rate_indexes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..16u8).filter(move |&i| self.data_rate(i).is_some())
    }

    /// Duty cycle limit of the sub-band containing `frequency`, if any
    pub fn sub_band_duty_cycle(&self, frequency: u64) -> Option<f32> {
        self.sub_bands
            .iter()
            .find(|sb| (sb.min_frequency..=sb.max_frequency).contains(&frequency))
            .map(|sb| sb.duty_cycle)
    }

    /// Minimal set of mask pairs turning `current` into `desired`
    pub fn generate_ch_masks(
        &self,
        current: &[bool],
        desired: &[bool],
        bank_masks: bool,
    ) -> Result<Vec<ChMaskPair>> {
        channel_mask::generate(self.mask_scheme, current, desired, bank_masks)
    }

    /// Apply one mask pair to `current`
    pub fn parse_ch_mask(&self, pair: &ChMaskPair, current: &[bool]) -> Result<Vec<bool>> {
        channel_mask::parse(self.mask_scheme, pair, current)
    }
}

pub static ALL: [&Band; 4] = [&eu868::EU_863_870, &us915::US_902_928, &us915::AU_915_928, &as923::AS_923];

/// Look up a band by its identifier, e.g. `EU_863_870`
pub fn by_id(id: &str) -> Option<&'static Band> {
    ALL.iter().copied().find(|b| b.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_id() {
        assert_eq!(by_id("EU_863_870").unwrap().id, "EU_863_870");
        assert_eq!(by_id("US_902_928").unwrap().max_uplink_channels, 72);
        assert!(by_id("XX_000_000").is_none());
    }

    #[test]
    fn test_default_channels_within_limits() {
        for band in ALL {
            assert!(band.uplink_channels.len() <= band.max_uplink_channels, "{}", band.id);
            assert!(band.downlink_channels.len() <= band.max_downlink_channels, "{}", band.id);
            for ch in band.uplink_channels {
                assert!(band.data_rate(ch.min_data_rate_index).is_some(), "{}", band.id);
                assert!(band.data_rate(ch.max_data_rate_index).is_some(), "{}", band.id);
            }
            assert!(band.data_rate(band.default_rx2.data_rate_index).is_some());
            assert!(band.data_rate(band.max_adr_data_rate_index).is_some());
        }
    }

    #[test]
    fn test_required_snr() {
        let band = by_id("EU_863_870").unwrap();
        assert_eq!(band.data_rate(0).unwrap().required_snr(), Some(-20.0));
        assert_eq!(band.data_rate(5).unwrap().required_snr(), Some(-7.5));
        assert_eq!(band.data_rate(7).unwrap().required_snr(), None);
    }

    #[test]
    fn test_sub_band_duty_cycle() {
        let band = by_id("EU_863_870").unwrap();
        assert_eq!(band.sub_band_duty_cycle(868_100_000), Some(0.01));
        assert_eq!(band.sub_band_duty_cycle(869_525_000), Some(0.1));
        assert_eq!(band.sub_band_duty_cycle(915_000_000), None);
    }
}
