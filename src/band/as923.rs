//! AS923 group 1 (AS923-1)

use super::*;

const DATA_RATES: [Option<DataRate>; 16] = [
    Some(DataRate::lora(12, 125_000, 59, 0)),
    Some(DataRate::lora(11, 125_000, 59, 0)),
    Some(DataRate::lora(10, 125_000, 59, 19)),
    Some(DataRate::lora(9, 125_000, 123, 61)),
    Some(DataRate::lora(8, 125_000, 250, 133)),
    Some(DataRate::lora(7, 125_000, 250, 250)),
    Some(DataRate::lora(7, 250_000, 250, 250)),
    Some(DataRate::fsk(50_000, 250, 250)),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
];

const CHANNELS: [BandChannel; 2] = [
    BandChannel::new(923_200_000, 0, 5),
    BandChannel::new(923_400_000, 0, 5),
];

const SUB_BANDS: [SubBand; 1] = [SubBand {
    min_frequency: 915_000_000,
    max_frequency: 928_000_000,
    duty_cycle: 0.01,
}];

const TX_OFFSETS: [f32; 8] = [0.0, -2.0, -4.0, -6.0, -8.0, -10.0, -12.0, -14.0];

const BEACON_FREQUENCIES: [u64; 1] = [923_400_000];

/// Offsets 6 and 7 raise the RX1 data rate by one and two steps
fn rx1_data_rate(dr: u8, offset: u8, dwell_time: bool) -> Option<u8> {
    if dr > 7 || offset > 7 {
        return None;
    }
    let effective = match offset {
        6 => -1,
        7 => -2,
        o => o as i8,
    };
    let min = if dwell_time { 2 } else { 0 };
    Some((dr as i8 - effective).clamp(min, 5) as u8)
}

pub static AS_923: Band = Band {
    id: "AS_923",
    uplink_channels: &CHANNELS,
    max_uplink_channels: 16,
    downlink_channels: &CHANNELS,
    max_downlink_channels: 16,
    sub_bands: &SUB_BANDS,
    data_rates: &DATA_RATES,
    max_adr_data_rate_index: 5,
    supports_dynamic_adr: true,
    tx_offsets: &TX_OFFSETS,
    default_max_eirp: 16.0,
    rx1_data_rate,
    max_rx1_data_rate_offset: 7,
    default_rx2: Rx2Parameters {
        data_rate_index: 2,
        frequency: 923_200_000,
    },
    beacon: BeaconParameters {
        data_rate_index: 3,
        frequencies: &BEACON_FREQUENCIES,
    },
    ping_slot_frequencies: &BEACON_FREQUENCIES,
    default_ping_slot_data_rate_index: 3,
    cf_list_type: CfListType::Frequencies,
    tx_param_setup_req_support: true,
    boot_uplink_dwell_time: true,
    boot_downlink_dwell_time: true,
    mask_scheme: MaskScheme::Dynamic16,
};
