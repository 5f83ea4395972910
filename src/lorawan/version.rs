//! LoRaWAN MAC version and the behavior switches that depend on it
//!
//! Every version-dependent branch in the MAC engine reads one of the
//! [`Capabilities`] fields below instead of comparing versions inline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Data rate index meaning "keep the current data rate" (LoRaWAN 1.0.4+)
pub const NO_CHANGE_DATA_RATE_INDEX: u8 = 15;
/// Tx power index meaning "keep the current Tx power" (LoRaWAN 1.0.4+)
pub const NO_CHANGE_TX_POWER_INDEX: u8 = 15;
/// Minor version the server confirms in RekeyConf and ResetConf
pub const SERVER_MINOR_VERSION: u8 = 1;

/// LoRaWAN MAC layer specification version
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum MacVersion {
    #[serde(rename = "1.0.0")]
    V1_0,
    #[serde(rename = "1.0.1")]
    V1_0_1,
    #[serde(rename = "1.0.2")]
    V1_0_2,
    #[serde(rename = "1.0.3")]
    V1_0_3,
    #[default]
    #[serde(rename = "1.0.4")]
    V1_0_4,
    #[serde(rename = "1.1")]
    V1_1,
}

impl fmt::Display for MacVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MacVersion::V1_0 => "1.0.0",
            MacVersion::V1_0_1 => "1.0.1",
            MacVersion::V1_0_2 => "1.0.2",
            MacVersion::V1_0_3 => "1.0.3",
            MacVersion::V1_0_4 => "1.0.4",
            MacVersion::V1_1 => "1.1",
        };
        write!(f, "{}", s)
    }
}

/// Version-dependent MAC behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Data rate index the device interprets as "no change", if any
    pub no_change_data_rate_index: Option<u8>,
    /// Tx power index the device interprets as "no change", if any
    pub no_change_tx_power_index: Option<u8>,
    /// The device answers every LinkADRReq of a block with its own LinkADRAns,
    /// so duplicate answers are tolerated up to the block size
    pub link_adr_ans_per_request: bool,
    /// RXParamSetupAns, RXTimingSetupAns and DlChannelAns are repeated in
    /// every uplink until a downlink is received
    pub sticky_answers: bool,
    pub tx_param_setup: bool,
    pub dl_channel: bool,
    pub device_time: bool,
    pub class_b: bool,
    /// Fixed channel plans accept ChMaskCntl 5 (one bit per 8-channel bank)
    pub bank_channel_masks: bool,
    pub reset: bool,
    pub rekey: bool,
    pub device_mode: bool,
    pub adr_param_setup: bool,
    pub rejoin_param_setup: bool,
    /// Class C devices start in class C right after activation
    pub implicit_class_c: bool,
}

const V1_0: Capabilities = Capabilities {
    no_change_data_rate_index: None,
    no_change_tx_power_index: None,
    link_adr_ans_per_request: false,
    sticky_answers: false,
    tx_param_setup: false,
    dl_channel: false,
    device_time: false,
    class_b: false,
    bank_channel_masks: false,
    reset: false,
    rekey: false,
    device_mode: false,
    adr_param_setup: false,
    rejoin_param_setup: false,
    implicit_class_c: true,
};

const V1_0_2: Capabilities = Capabilities {
    link_adr_ans_per_request: true,
    sticky_answers: true,
    tx_param_setup: true,
    dl_channel: true,
    ..V1_0
};

const V1_0_3: Capabilities = Capabilities {
    device_time: true,
    class_b: true,
    bank_channel_masks: true,
    ..V1_0_2
};

const V1_0_4: Capabilities = Capabilities {
    no_change_data_rate_index: Some(NO_CHANGE_DATA_RATE_INDEX),
    no_change_tx_power_index: Some(NO_CHANGE_TX_POWER_INDEX),
    ..V1_0_3
};

const V1_1: Capabilities = Capabilities {
    link_adr_ans_per_request: false,
    reset: true,
    rekey: true,
    device_mode: true,
    adr_param_setup: true,
    rejoin_param_setup: true,
    implicit_class_c: false,
    ..V1_0_4
};

/// Look up the behavior switches for a MAC version
pub fn capabilities(version: MacVersion) -> &'static Capabilities {
    match version {
        MacVersion::V1_0 | MacVersion::V1_0_1 => &V1_0,
        MacVersion::V1_0_2 => &V1_0_2,
        MacVersion::V1_0_3 => &V1_0_3,
        MacVersion::V1_0_4 => &V1_0_4,
        MacVersion::V1_1 => &V1_1,
    }
}

impl MacVersion {
    /// Shorthand for [`capabilities`]
    pub fn capabilities(self) -> &'static Capabilities {
        capabilities(self)
    }
}
