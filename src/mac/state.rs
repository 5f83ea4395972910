//! Per-device MAC state
//!
//! `MacState` owns the current (device-acknowledged) and desired (server
//! target) radio parameters together with the in-flight request queue. It is
//! owned by exactly one [`EndDevice`] and mutated only through the handlers in
//! [`crate::mac`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::band::Band;
use crate::error::{Corruption, Result};
use crate::lorawan::commands::{
    NewChannelReq, RelayForwardLimits, ServedRelayConfig, ServingRelayConfig,
};
use crate::lorawan::{DevAddr, DeviceClass, DownlinkCommand, MacVersion};
use crate::mac::settings::MacSettings;

/// Number of uplinks kept for ADR and frame loss estimation
pub const RECENT_UPLINKS: usize = 20;

/// One logical channel as known by the device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Channel {
    pub uplink_frequency: u64,
    pub downlink_frequency: u64,
    pub min_data_rate_index: u8,
    pub max_data_rate_index: u8,
    pub enable_uplink: bool,
}

/// An uplink forwarding rule installed on a serving relay
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayForwardingRule {
    pub device_id: String,
    /// Identifies the served device's session keys in the key service
    pub session_key_id: String,
    pub dev_addr: DevAddr,
    pub forward_limits: Option<RelayForwardLimits>,
    pub last_w_f_cnt: u32,
}

/// Relay role of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RelayParameters {
    /// The device relays uplinks of other devices
    Serving {
        config: ServingRelayConfig,
        #[serde(default)]
        uplink_forwarding_rules: Vec<RelayForwardingRule>,
    },
    /// The device is reached through a relay
    Served {
        config: ServedRelayConfig,
        serving_device_id: String,
    },
}

impl RelayParameters {
    pub fn serving_config(&self) -> Option<&ServingRelayConfig> {
        match self {
            RelayParameters::Serving { config, .. } => Some(config),
            RelayParameters::Served { .. } => None,
        }
    }

    pub fn served_config(&self) -> Option<&ServedRelayConfig> {
        match self {
            RelayParameters::Served { config, .. } => Some(config),
            RelayParameters::Serving { .. } => None,
        }
    }

    pub fn forwarding_rules(&self) -> &[RelayForwardingRule] {
        match self {
            RelayParameters::Serving {
                uplink_forwarding_rules,
                ..
            } => uplink_forwarding_rules,
            RelayParameters::Served { .. } => &[],
        }
    }
}

/// Radio parameters; every MAC state holds a current and a desired copy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MacParameters {
    pub data_rate_index: u8,
    pub tx_power_index: u8,
    pub nb_trans: u8,
    /// Seconds
    pub rx1_delay: u8,
    pub rx1_data_rate_offset: u8,
    pub rx2_data_rate_index: u8,
    pub rx2_frequency: u64,
    /// Aggregated duty cycle is 1 / 2^max_duty_cycle
    pub max_duty_cycle: u8,
    pub adr_ack_limit_exponent: u8,
    pub adr_ack_delay_exponent: u8,
    pub rejoin_count_exponent: u8,
    pub rejoin_time_exponent: u8,
    pub uplink_dwell_time: Option<bool>,
    pub downlink_dwell_time: Option<bool>,
    /// dBm
    pub max_eirp: f32,
    /// 0 means hopping over the band's ping slot channels
    pub ping_slot_frequency: u64,
    pub ping_slot_data_rate_index: u8,
    /// 0 means the band's default beacon channels
    pub beacon_frequency: u64,
    pub relay: Option<RelayParameters>,
    pub channels: Vec<Channel>,
}

impl MacParameters {
    /// Check the channel list against the band limits
    pub fn validate_channels(&self, phy: &Band) -> Result<()> {
        if self.channels.len() > phy.max_uplink_channels {
            return Err(Corruption::TooManyChannels {
                len: self.channels.len(),
                max: phy.max_uplink_channels,
            }
            .into());
        }
        if let Some(index) = self
            .channels
            .iter()
            .position(|ch| ch.enable_uplink && ch.uplink_frequency == 0)
        {
            return Err(Corruption::EnabledWithoutFrequency { index }.into());
        }
        Ok(())
    }

    /// Union of the data rate ranges of the enabled uplink channels
    pub fn allowed_data_rate_range(&self) -> Result<(u8, u8)> {
        let (min, max) = self
            .channels
            .iter()
            .filter(|ch| ch.enable_uplink)
            .fold((u8::MAX, 0u8), |(min, max), ch| {
                (min.min(ch.min_data_rate_index), max.max(ch.max_data_rate_index))
            });
        if min > max {
            return Err(Corruption::EmptyDataRateRange { min, max }.into());
        }
        Ok((min, max))
    }
}

/// Metadata of a received uplink kept for ADR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkRecord {
    pub f_cnt: u32,
    pub data_rate_index: u8,
    pub adr: bool,
    /// Best SNR across all gateways, dB
    pub max_snr: f32,
    pub gateway_count: u8,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MacState {
    pub lorawan_version: MacVersion,
    pub device_class: DeviceClass,
    pub current_parameters: MacParameters,
    pub desired_parameters: MacParameters,
    pub ping_slot_periodicity: Option<u8>,
    /// Requests sent but not yet answered, oldest first
    pub pending_requests: Vec<DownlinkCommand>,
    /// Answers and confirmations to send in the next downlink
    pub queued_responses: Vec<DownlinkCommand>,
    pub rejected_adr_data_rate_indexes: BTreeSet<u8>,
    pub rejected_adr_tx_power_indexes: BTreeSet<u8>,
    /// Uplink frequencies the device refused in NewChannelAns
    pub rejected_frequencies: BTreeSet<u64>,
    pub recent_uplinks: Vec<UplinkRecord>,
    pub last_adr_change_f_cnt_up: u32,
    pub last_dev_status_f_cnt_up: u32,
    pub last_dev_status_at: Option<DateTime<Utc>>,
}

impl MacState {
    pub fn has_pending(&self, cid: crate::lorawan::Cid) -> bool {
        self.pending_requests.iter().any(|c| c.cid() == cid)
    }

    /// Pending NewChannelReq commands, oldest first
    pub fn pending_new_channels(&self) -> impl Iterator<Item = &NewChannelReq> {
        self.pending_requests.iter().filter_map(|c| match c {
            DownlinkCommand::NewChannelReq(req) => Some(req),
            _ => None,
        })
    }

    /// ADR bit of the most recent uplink; devices start with ADR on
    pub fn device_adr_enabled(&self) -> bool {
        self.recent_uplinks.last().map_or(true, |up| up.adr)
    }

    pub fn record_uplink(&mut self, record: UplinkRecord) {
        self.recent_uplinks.push(record);
        if self.recent_uplinks.len() > RECENT_UPLINKS {
            let excess = self.recent_uplinks.len() - RECENT_UPLINKS;
            self.recent_uplinks.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    pub dev_addr: DevAddr,
    /// Identifies the session keys in the key service
    pub keys_id: String,
    pub last_f_cnt_up: u32,
    pub started_at: Option<DateTime<Utc>>,
}

/// Device power source as last reported in DevStatusAns
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    Unknown,
    External,
    Battery {
        percentage: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EndDevice {
    pub device_id: String,
    pub lorawan_version: MacVersion,
    pub supports_join: bool,
    pub multicast: bool,
    pub mac_settings: MacSettings,
    pub mac_state: MacState,
    pub session: Session,
    /// Session derived by a rejoin, activated on RekeyInd
    pub pending_session: Option<Session>,
    pub power_state: PowerState,
    /// Demodulation margin reported in the last DevStatusAns, dB
    pub downlink_margin: Option<i8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::error::MacError;
    use chrono::TimeZone;

    fn record(f_cnt: u32, adr: bool) -> UplinkRecord {
        UplinkRecord {
            f_cnt,
            data_rate_index: 0,
            adr,
            max_snr: 5.0,
            gateway_count: 1,
            received_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_recent_uplinks_are_bounded() {
        let mut state = MacState::default();
        for f_cnt in 0..30 {
            state.record_uplink(record(f_cnt, f_cnt % 2 == 0));
        }
        assert_eq!(state.recent_uplinks.len(), RECENT_UPLINKS);
        assert_eq!(state.recent_uplinks[0].f_cnt, 10);
        assert!(!state.device_adr_enabled());
    }

    #[test]
    fn test_allowed_data_rate_range() {
        let channel = |min, max, on| Channel {
            uplink_frequency: 868_100_000,
            downlink_frequency: 868_100_000,
            min_data_rate_index: min,
            max_data_rate_index: max,
            enable_uplink: on,
        };
        let mut params = MacParameters {
            channels: vec![channel(0, 5, true), channel(6, 6, false), channel(1, 7, true)],
            ..Default::default()
        };
        assert_eq!(params.allowed_data_rate_range().unwrap(), (0, 7));

        for ch in &mut params.channels {
            ch.enable_uplink = false;
        }
        assert!(matches!(
            params.allowed_data_rate_range(),
            Err(MacError::CorruptedMacState(Corruption::EmptyDataRateRange { min: 255, max: 0 }))
        ));
    }

    #[test]
    fn test_validate_channels() {
        let phy = band::by_id("EU_863_870").unwrap();
        let mut params = MacParameters {
            channels: vec![Channel::default(); 17],
            ..Default::default()
        };
        assert!(matches!(
            params.validate_channels(phy),
            Err(MacError::CorruptedMacState(Corruption::TooManyChannels { len: 17, max: 16 }))
        ));
        params.channels.truncate(3);
        params.channels[1].enable_uplink = true;
        assert!(matches!(
            params.validate_channels(phy),
            Err(MacError::CorruptedMacState(Corruption::EnabledWithoutFrequency { index: 1 }))
        ));
    }

    #[test]
    fn test_relay_parameters_roles() {
        let served = RelayParameters::Served {
            config: ServedRelayConfig {
                mode: crate::lorawan::commands::ServedRelayMode::Always,
                backoff: 0,
                second_channel: None,
            },
            serving_device_id: "relay-1".to_string(),
        };
        assert!(served.serving_config().is_none());
        assert!(served.served_config().is_some());
        assert!(served.forwarding_rules().is_empty());
    }
}
