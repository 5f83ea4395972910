//! MAC command payloads
//!
//! `DownlinkCommand` covers everything the server sends (requests and
//! confirmations), `UplinkCommand` everything the device sends (answers and
//! indications). Frequencies are in Hz.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cid, DevAddr, DeviceClass};

/// Relay second channel settings shared by RelayConfReq and RelayEndDeviceConfReq
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySecondChannel {
    /// Index into the band's ACK offset table
    pub ack_offset: u8,
    pub data_rate_index: u8,
    pub frequency: u64,
}

/// Radio settings of a relay (serving) device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingRelayConfig {
    pub second_channel: Option<RelaySecondChannel>,
    pub default_channel_index: u8,
    pub cad_periodicity: u8,
}

/// How a served end device decides to go through its relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ServedRelayMode {
    Always,
    Dynamic { smart_enable_level: u8 },
    EndDeviceControlled,
}

/// Relay settings of a served end device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedRelayConfig {
    pub mode: ServedRelayMode,
    pub backoff: u8,
    pub second_channel: Option<RelaySecondChannel>,
}

/// Token bucket limits for uplinks a relay forwards on behalf of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayForwardLimits {
    pub bucket_size: u8,
    pub reload_rate: u8,
}

// Server → device

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetConf {
    pub minor_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCheckAns {
    pub margin: u8,
    pub gateway_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAdrReq {
    pub data_rate_index: u8,
    pub tx_power_index: u8,
    pub channel_mask: u16,
    pub channel_mask_control: u8,
    pub nb_trans: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCycleReq {
    /// Aggregated duty cycle is 1 / 2^max_duty_cycle
    pub max_duty_cycle: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxParamSetupReq {
    pub rx1_data_rate_offset: u8,
    pub rx2_data_rate_index: u8,
    pub rx2_frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevStatusReq;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChannelReq {
    pub channel_index: u8,
    pub frequency: u64,
    pub min_data_rate_index: u8,
    pub max_data_rate_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxTimingSetupReq {
    /// RX1 delay in seconds (1..=15)
    pub delay: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParamSetupReq {
    pub max_eirp_index: u8,
    pub uplink_dwell_time: bool,
    pub downlink_dwell_time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlChannelReq {
    pub channel_index: u8,
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyConf {
    pub minor_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdrParamSetupReq {
    pub adr_ack_limit_exponent: u8,
    pub adr_ack_delay_exponent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTimeAns {
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejoinParamSetupReq {
    pub max_count_exponent: u8,
    pub max_time_exponent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSlotInfoAns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSlotChannelReq {
    pub frequency: u64,
    pub data_rate_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconFreqReq {
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModeConf {
    pub class: DeviceClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfReq {
    /// `None` stops the relay
    pub configuration: Option<ServingRelayConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndDeviceConfReq {
    /// `None` disables relay mode on the end device
    pub configuration: Option<ServedRelayConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayUpdateUplinkListReq {
    pub rule_index: u8,
    pub forward_limits: Option<RelayForwardLimits>,
    pub dev_addr: DevAddr,
    pub w_f_cnt: u32,
    #[serde(with = "hex_key")]
    pub root_wor_s_key: [u8; 16],
}

// Device → server

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInd {
    pub minor_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCheckReq;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAdrAns {
    pub channel_mask_ack: bool,
    pub data_rate_index_ack: bool,
    pub tx_power_index_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCycleAns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxParamSetupAns {
    pub rx1_data_rate_offset_ack: bool,
    pub rx2_data_rate_index_ack: bool,
    pub rx2_frequency_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevStatusAns {
    /// 0 external power, 1..=254 level, 255 unknown
    pub battery: u8,
    /// Demodulation margin in dB (-32..=31)
    pub margin: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChannelAns {
    pub frequency_ack: bool,
    pub data_rate_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxTimingSetupAns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParamSetupAns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlChannelAns {
    pub channel_index_ack: bool,
    pub frequency_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyInd {
    pub minor_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdrParamSetupAns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTimeReq;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejoinParamSetupAns {
    pub max_time_exponent_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSlotInfoReq {
    pub periodicity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSlotChannelAns {
    pub frequency_ack: bool,
    pub data_rate_index_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconFreqAns {
    pub frequency_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModeInd {
    pub class: DeviceClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfAns {
    pub second_channel_frequency_ack: bool,
    pub second_channel_ack_offset_ack: bool,
    pub second_channel_data_rate_index_ack: bool,
    pub second_channel_index_ack: bool,
    pub default_channel_index_ack: bool,
    pub cad_periodicity_ack: bool,
}

impl RelayConfAns {
    pub fn all_acked(&self) -> bool {
        self.second_channel_frequency_ack
            && self.second_channel_ack_offset_ack
            && self.second_channel_data_rate_index_ack
            && self.second_channel_index_ack
            && self.default_channel_index_ack
            && self.cad_periodicity_ack
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndDeviceConfAns {
    pub second_channel_frequency_ack: bool,
    pub second_channel_data_rate_index_ack: bool,
    pub second_channel_index_ack: bool,
    pub backoff_ack: bool,
}

impl RelayEndDeviceConfAns {
    pub fn all_acked(&self) -> bool {
        self.second_channel_frequency_ack
            && self.second_channel_data_rate_index_ack
            && self.second_channel_index_ack
            && self.backoff_ack
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayUpdateUplinkListAns;

/// A MAC command sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cid", content = "payload", rename_all = "snake_case")]
pub enum DownlinkCommand {
    ResetConf(ResetConf),
    LinkCheckAns(LinkCheckAns),
    LinkAdrReq(LinkAdrReq),
    DutyCycleReq(DutyCycleReq),
    RxParamSetupReq(RxParamSetupReq),
    DevStatusReq(DevStatusReq),
    NewChannelReq(NewChannelReq),
    RxTimingSetupReq(RxTimingSetupReq),
    TxParamSetupReq(TxParamSetupReq),
    DlChannelReq(DlChannelReq),
    RekeyConf(RekeyConf),
    AdrParamSetupReq(AdrParamSetupReq),
    DeviceTimeAns(DeviceTimeAns),
    RejoinParamSetupReq(RejoinParamSetupReq),
    PingSlotInfoAns(PingSlotInfoAns),
    PingSlotChannelReq(PingSlotChannelReq),
    BeaconFreqReq(BeaconFreqReq),
    DeviceModeConf(DeviceModeConf),
    RelayConfReq(RelayConfReq),
    RelayEndDeviceConfReq(RelayEndDeviceConfReq),
    RelayUpdateUplinkListReq(RelayUpdateUplinkListReq),
}

impl DownlinkCommand {
    pub fn cid(&self) -> Cid {
        match self {
            DownlinkCommand::ResetConf(_) => Cid::Reset,
            DownlinkCommand::LinkCheckAns(_) => Cid::LinkCheck,
            DownlinkCommand::LinkAdrReq(_) => Cid::LinkAdr,
            DownlinkCommand::DutyCycleReq(_) => Cid::DutyCycle,
            DownlinkCommand::RxParamSetupReq(_) => Cid::RxParamSetup,
            DownlinkCommand::DevStatusReq(_) => Cid::DevStatus,
            DownlinkCommand::NewChannelReq(_) => Cid::NewChannel,
            DownlinkCommand::RxTimingSetupReq(_) => Cid::RxTimingSetup,
            DownlinkCommand::TxParamSetupReq(_) => Cid::TxParamSetup,
            DownlinkCommand::DlChannelReq(_) => Cid::DlChannel,
            DownlinkCommand::RekeyConf(_) => Cid::Rekey,
            DownlinkCommand::AdrParamSetupReq(_) => Cid::AdrParamSetup,
            DownlinkCommand::DeviceTimeAns(_) => Cid::DeviceTime,
            DownlinkCommand::RejoinParamSetupReq(_) => Cid::RejoinParamSetup,
            DownlinkCommand::PingSlotInfoAns(_) => Cid::PingSlotInfo,
            DownlinkCommand::PingSlotChannelReq(_) => Cid::PingSlotChannel,
            DownlinkCommand::BeaconFreqReq(_) => Cid::BeaconFreq,
            DownlinkCommand::DeviceModeConf(_) => Cid::DeviceMode,
            DownlinkCommand::RelayConfReq(_) => Cid::RelayConf,
            DownlinkCommand::RelayEndDeviceConfReq(_) => Cid::RelayEndDeviceConf,
            DownlinkCommand::RelayUpdateUplinkListReq(_) => Cid::RelayUpdateUplinkList,
        }
    }

    /// Encoded size including the CID byte
    pub fn encoded_len(&self) -> u16 {
        1 + self.cid().downlink_len()
    }
}

/// A MAC command sent by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cid", content = "payload", rename_all = "snake_case")]
pub enum UplinkCommand {
    ResetInd(ResetInd),
    LinkCheckReq(LinkCheckReq),
    LinkAdrAns(LinkAdrAns),
    DutyCycleAns(DutyCycleAns),
    RxParamSetupAns(RxParamSetupAns),
    DevStatusAns(DevStatusAns),
    NewChannelAns(NewChannelAns),
    RxTimingSetupAns(RxTimingSetupAns),
    TxParamSetupAns(TxParamSetupAns),
    DlChannelAns(DlChannelAns),
    RekeyInd(RekeyInd),
    AdrParamSetupAns(AdrParamSetupAns),
    DeviceTimeReq(DeviceTimeReq),
    RejoinParamSetupAns(RejoinParamSetupAns),
    PingSlotInfoReq(PingSlotInfoReq),
    PingSlotChannelAns(PingSlotChannelAns),
    BeaconFreqAns(BeaconFreqAns),
    DeviceModeInd(DeviceModeInd),
    RelayConfAns(RelayConfAns),
    RelayEndDeviceConfAns(RelayEndDeviceConfAns),
    RelayUpdateUplinkListAns(RelayUpdateUplinkListAns),
}

impl UplinkCommand {
    pub fn cid(&self) -> Cid {
        match self {
            UplinkCommand::ResetInd(_) => Cid::Reset,
            UplinkCommand::LinkCheckReq(_) => Cid::LinkCheck,
            UplinkCommand::LinkAdrAns(_) => Cid::LinkAdr,
            UplinkCommand::DutyCycleAns(_) => Cid::DutyCycle,
            UplinkCommand::RxParamSetupAns(_) => Cid::RxParamSetup,
            UplinkCommand::DevStatusAns(_) => Cid::DevStatus,
            UplinkCommand::NewChannelAns(_) => Cid::NewChannel,
            UplinkCommand::RxTimingSetupAns(_) => Cid::RxTimingSetup,
            UplinkCommand::TxParamSetupAns(_) => Cid::TxParamSetup,
            UplinkCommand::DlChannelAns(_) => Cid::DlChannel,
            UplinkCommand::RekeyInd(_) => Cid::Rekey,
            UplinkCommand::AdrParamSetupAns(_) => Cid::AdrParamSetup,
            UplinkCommand::DeviceTimeReq(_) => Cid::DeviceTime,
            UplinkCommand::RejoinParamSetupAns(_) => Cid::RejoinParamSetup,
            UplinkCommand::PingSlotInfoReq(_) => Cid::PingSlotInfo,
            UplinkCommand::PingSlotChannelAns(_) => Cid::PingSlotChannel,
            UplinkCommand::BeaconFreqAns(_) => Cid::BeaconFreq,
            UplinkCommand::DeviceModeInd(_) => Cid::DeviceMode,
            UplinkCommand::RelayConfAns(_) => Cid::RelayConf,
            UplinkCommand::RelayEndDeviceConfAns(_) => Cid::RelayEndDeviceConf,
            UplinkCommand::RelayUpdateUplinkListAns(_) => Cid::RelayUpdateUplinkList,
        }
    }

    /// Encoded size including the CID byte
    pub fn encoded_len(&self) -> u16 {
        1 + self.cid().uplink_len()
    }
}

/// A request payload that can be matched against the pending request queue
pub trait Request: Clone {
    const CID: Cid;

    fn from_command(cmd: &DownlinkCommand) -> Option<&Self>;
    fn into_command(self) -> DownlinkCommand;
}

macro_rules! impl_request {
    ($($ty:ident => $cid:ident),* $(,)?) => {
        $(
            impl Request for $ty {
                const CID: Cid = Cid::$cid;

                fn from_command(cmd: &DownlinkCommand) -> Option<&Self> {
                    match cmd {
                        DownlinkCommand::$ty(req) => Some(req),
                        _ => None,
                    }
                }

                fn into_command(self) -> DownlinkCommand {
                    DownlinkCommand::$ty(self)
                }
            }
        )*
    };
}

impl_request! {
    LinkAdrReq => LinkAdr,
    DutyCycleReq => DutyCycle,
    RxParamSetupReq => RxParamSetup,
    DevStatusReq => DevStatus,
    NewChannelReq => NewChannel,
    RxTimingSetupReq => RxTimingSetup,
    TxParamSetupReq => TxParamSetup,
    DlChannelReq => DlChannel,
    AdrParamSetupReq => AdrParamSetup,
    RejoinParamSetupReq => RejoinParamSetup,
    PingSlotChannelReq => PingSlotChannel,
    BeaconFreqReq => BeaconFreq,
    RelayConfReq => RelayConf,
    RelayEndDeviceConfReq => RelayEndDeviceConf,
    RelayUpdateUplinkListReq => RelayUpdateUplinkList,
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("key must be 16 bytes"))
    }
}
