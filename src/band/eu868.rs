//! EU863-870

use super::*;

const DATA_RATES: [Option<DataRate>; 16] = [
    Some(DataRate::lora(12, 125_000, 59, 59)),
    Some(DataRate::lora(11, 125_000, 59, 59)),
    Some(DataRate::lora(10, 125_000, 59, 59)),
    Some(DataRate::lora(9, 125_000, 123, 123)),
    Some(DataRate::lora(8, 125_000, 250, 250)),
    Some(DataRate::lora(7, 125_000, 250, 250)),
    Some(DataRate::lora(7, 250_000, 250, 250)),
    Some(DataRate::fsk(50_000, 250, 250)),
    None, // LR-FHSS
    None,
    None,
    None,
    None,
    None,
    None,
    None,
];

const CHANNELS: [BandChannel; 3] = [
    BandChannel::new(868_100_000, 0, 5),
    BandChannel::new(868_300_000, 0, 5),
    BandChannel::new(868_500_000, 0, 5),
];

const SUB_BANDS: [SubBand; 6] = [
    SubBand {
        min_frequency: 863_000_000,
        max_frequency: 865_000_000,
        duty_cycle: 0.001,
    },
    SubBand {
        min_frequency: 865_000_000,
        max_frequency: 868_000_000,
        duty_cycle: 0.01,
    },
    SubBand {
        min_frequency: 868_000_000,
        max_frequency: 868_600_000,
        duty_cycle: 0.01,
    },
    SubBand {
        min_frequency: 868_700_000,
        max_frequency: 869_200_000,
        duty_cycle: 0.001,
    },
    SubBand {
        min_frequency: 869_400_000,
        max_frequency: 869_650_000,
        duty_cycle: 0.1,
    },
    SubBand {
        min_frequency: 869_700_000,
        max_frequency: 870_000_000,
        duty_cycle: 0.01,
    },
];

const TX_OFFSETS: [f32; 8] = [0.0, -2.0, -4.0, -6.0, -8.0, -10.0, -12.0, -14.0];

const BEACON_FREQUENCIES: [u64; 1] = [869_525_000];

fn rx1_data_rate(dr: u8, offset: u8, _dwell_time: bool) -> Option<u8> {
    if dr > 7 || offset > 5 {
        return None;
    }
    Some(dr.saturating_sub(offset))
}

pub static EU_863_870: Band = Band {
    id: "EU_863_870",
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
    max_rx1_data_rate_offset: 5,
    default_rx2: Rx2Parameters {
        data_rate_index: 0,
        frequency: 869_525_000,
    },
    beacon: BeaconParameters {
        data_rate_index: 3,
        frequencies: &BEACON_FREQUENCIES,
    },
    ping_slot_frequencies: &BEACON_FREQUENCIES,
    default_ping_slot_data_rate_index: 3,
    cf_list_type: CfListType::Frequencies,
    tx_param_setup_req_support: false,
    boot_uplink_dwell_time: false,
    boot_downlink_dwell_time: false,
    mask_scheme: MaskScheme::Dynamic16,
};
