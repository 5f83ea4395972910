//! US902-928 and AU915-928
//!
//! Both are fixed 72-channel plans: 64 125 kHz uplink channels, 8 500 kHz
//! uplink channels and 8 500 kHz downlink channels.

use super::*;

const US_DATA_RATES: [Option<DataRate>; 16] = [
    Some(DataRate::lora(10, 125_000, 19, 19)),
    Some(DataRate::lora(9, 125_000, 61, 61)),
    Some(DataRate::lora(8, 125_000, 133, 133)),
    Some(DataRate::lora(7, 125_000, 250, 250)),
    Some(DataRate::lora(8, 500_000, 250, 250)),
    None, // LR-FHSS
    None,
    None,
    Some(DataRate::lora(12, 500_000, 61, 61)),
    Some(DataRate::lora(11, 500_000, 137, 137)),
    Some(DataRate::lora(10, 500_000, 250, 250)),
    Some(DataRate::lora(9, 500_000, 250, 250)),
    Some(DataRate::lora(8, 500_000, 250, 250)),
    Some(DataRate::lora(7, 500_000, 250, 250)),
    None,
    None,
];

const AU_DATA_RATES: [Option<DataRate>; 16] = [
    Some(DataRate::lora(12, 125_000, 59, 0)),
    Some(DataRate::lora(11, 125_000, 59, 0)),
    Some(DataRate::lora(10, 125_000, 59, 19)),
    Some(DataRate::lora(9, 125_000, 123, 61)),
    Some(DataRate::lora(8, 125_000, 250, 133)),
    Some(DataRate::lora(7, 125_000, 250, 250)),
    Some(DataRate::lora(8, 500_000, 250, 250)),
    None, // LR-FHSS
    Some(DataRate::lora(12, 500_000, 61, 61)),
    Some(DataRate::lora(11, 500_000, 137, 137)),
    Some(DataRate::lora(10, 500_000, 250, 250)),
    Some(DataRate::lora(9, 500_000, 250, 250)),
    Some(DataRate::lora(8, 500_000, 250, 250)),
    Some(DataRate::lora(7, 500_000, 250, 250)),
    None,
    None,
];

const fn uplink_channels(
    base_125: u64,
    base_500: u64,
    max_dr_125: u8,
    dr_500: u8,
) -> [BandChannel; 72] {
    let mut chans = [BandChannel::new(0, 0, 0); 72];
    let mut i = 0;
    while i < 64 {
        chans[i] = BandChannel::new(base_125 + 200_000 * i as u64, 0, max_dr_125);
        i += 1;
    }
    while i < 72 {
        chans[i] = BandChannel::new(base_500 + 1_600_000 * (i as u64 - 64), dr_500, dr_500);
        i += 1;
    }
    chans
}

const fn downlink_channels() -> [BandChannel; 8] {
    let mut chans = [BandChannel::new(0, 0, 0); 8];
    let mut i = 0;
    while i < 8 {
        chans[i] = BandChannel::new(923_300_000 + 600_000 * i as u64, 8, 13);
        i += 1;
    }
    chans
}

const US_UPLINK_CHANNELS: [BandChannel; 72] = uplink_channels(902_300_000, 903_000_000, 3, 4);
const AU_UPLINK_CHANNELS: [BandChannel; 72] = uplink_channels(915_200_000, 915_900_000, 5, 6);
const DOWNLINK_CHANNELS: [BandChannel; 8] = downlink_channels();

const DOWNLINK_FREQUENCIES: [u64; 8] = [
    923_300_000,
    923_900_000,
    924_500_000,
    925_100_000,
    925_700_000,
    926_300_000,
    926_900_000,
    927_500_000,
];

const TX_OFFSETS: [f32; 15] = [
    0.0, -2.0, -4.0, -6.0, -8.0, -10.0, -12.0, -14.0, -16.0, -18.0, -20.0, -22.0, -24.0, -26.0,
    -28.0,
];

const SUB_BANDS_US: [SubBand; 1] = [SubBand {
    min_frequency: 902_000_000,
    max_frequency: 928_000_000,
    duty_cycle: 1.0,
}];

const SUB_BANDS_AU: [SubBand; 1] = [SubBand {
    min_frequency: 915_000_000,
    max_frequency: 928_000_000,
    duty_cycle: 1.0,
}];

fn us_rx1_data_rate(dr: u8, offset: u8, _dwell_time: bool) -> Option<u8> {
    const BASE: [u8; 5] = [10, 11, 12, 13, 13];
    if offset > 3 {
        return None;
    }
    let base = *BASE.get(dr as usize)?;
    Some(base.saturating_sub(offset).max(8))
}

fn au_rx1_data_rate(dr: u8, offset: u8, _dwell_time: bool) -> Option<u8> {
    const BASE: [u8; 7] = [8, 9, 10, 11, 12, 13, 13];
    if offset > 5 {
        return None;
    }
    let base = *BASE.get(dr as usize)?;
    Some(base.saturating_sub(offset).max(8))
}

pub static US_902_928: Band = Band {
    id: "US_902_928",
    uplink_channels: &US_UPLINK_CHANNELS,
    max_uplink_channels: 72,
    downlink_channels: &DOWNLINK_CHANNELS,
    max_downlink_channels: 8,
    sub_bands: &SUB_BANDS_US,
    data_rates: &US_DATA_RATES,
    max_adr_data_rate_index: 3,
    supports_dynamic_adr: true,
    tx_offsets: &TX_OFFSETS,
    default_max_eirp: 30.0,
    rx1_data_rate: us_rx1_data_rate,
    max_rx1_data_rate_offset: 3,
    default_rx2: Rx2Parameters {
        data_rate_index: 8,
        frequency: 923_300_000,
    },
    beacon: BeaconParameters {
        data_rate_index: 8,
        frequencies: &DOWNLINK_FREQUENCIES,
    },
    ping_slot_frequencies: &DOWNLINK_FREQUENCIES,
    default_ping_slot_data_rate_index: 8,
    cf_list_type: CfListType::ChannelMasks,
    tx_param_setup_req_support: false,
    boot_uplink_dwell_time: false,
    boot_downlink_dwell_time: false,
    mask_scheme: MaskScheme::Fixed72,
};

pub static AU_915_928: Band = Band {
    id: "AU_915_928",
    uplink_channels: &AU_UPLINK_CHANNELS,
    max_uplink_channels: 72,
    downlink_channels: &DOWNLINK_CHANNELS,
    max_downlink_channels: 8,
    sub_bands: &SUB_BANDS_AU,
    data_rates: &AU_DATA_RATES,
    max_adr_data_rate_index: 5,
    supports_dynamic_adr: true,
    tx_offsets: &TX_OFFSETS,
    default_max_eirp: 30.0,
    rx1_data_rate: au_rx1_data_rate,
    max_rx1_data_rate_offset: 5,
    default_rx2: Rx2Parameters {
        data_rate_index: 8,
        frequency: 923_300_000,
    },
    beacon: BeaconParameters {
        data_rate_index: 8,
        frequencies: &DOWNLINK_FREQUENCIES,
    },
    ping_slot_frequencies: &DOWNLINK_FREQUENCIES,
    default_ping_slot_data_rate_index: 8,
    cf_list_type: CfListType::ChannelMasks,
    tx_param_setup_req_support: true,
    boot_uplink_dwell_time: false,
    boot_downlink_dwell_time: false,
    mask_scheme: MaskScheme::Fixed72,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_channel_layout() {
        let chans = US_902_928.uplink_channels;
        assert_eq!(chans[0].frequency, 902_300_000);
        assert_eq!(chans[63].frequency, 914_900_000);
        assert_eq!(chans[64].frequency, 903_000_000);
        assert_eq!(chans[71].frequency, 914_200_000);
        assert_eq!((chans[64].min_data_rate_index, chans[64].max_data_rate_index), (4, 4));
        assert_eq!(US_902_928.downlink_channels[7].frequency, 927_500_000);
    }

    #[test]
    fn test_rx1_data_rate_tables() {
        assert_eq!(us_rx1_data_rate(0, 0, false), Some(10));
        assert_eq!(us_rx1_data_rate(4, 3, false), Some(10));
        assert_eq!(us_rx1_data_rate(0, 3, false), Some(8));
        assert_eq!(us_rx1_data_rate(5, 0, false), None);
        assert_eq!(au_rx1_data_rate(6, 0, false), Some(13));
        assert_eq!(au_rx1_data_rate(2, 5, false), Some(8));
    }

    #[test]
    fn test_au915_supports_tx_param_setup() {
        assert!(AU_915_928.tx_param_setup_req_support);
        assert!(!US_902_928.tx_param_setup_req_support);
        assert_eq!(US_902_928.max_tx_power_index(), 14);
    }
}
