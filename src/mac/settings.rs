//! MAC settings and the parameter derivation chain
//!
//! Every parameter is resolved through the same priority chain: device
//! settings, then the profile defaults, then the global defaults, then the
//! frequency plan and band. Fresh MAC states and desired parameters are both
//! built from here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::band::Band;
use crate::error::Result;
use crate::frequency_plan::{CfList, FrequencyPlan};
use crate::lorawan::{DeviceClass, MacVersion};
use crate::mac::adr;
use crate::mac::state::{EndDevice, MacParameters, MacState, RelayParameters};

pub const DEFAULT_RX1_DELAY: u8 = 1;
pub const DEFAULT_NB_TRANS: u8 = 1;
pub const DEFAULT_ADR_ACK_LIMIT_EXPONENT: u8 = 6;
pub const DEFAULT_ADR_ACK_DELAY_EXPONENT: u8 = 5;
pub const DEFAULT_STATUS_COUNT_PERIODICITY: u32 = 200;
/// Seconds
pub const DEFAULT_STATUS_TIME_PERIODICITY: u64 = 24 * 60 * 60;
/// dB of link budget kept in reserve by dynamic ADR
pub const DEFAULT_ADR_MARGIN: f32 = 15.0;

/// How the network picks data rate, Tx power and NbTrans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdrMode {
    Dynamic {
        #[serde(default)]
        margin: Option<f32>,
    },
    Static {
        data_rate_index: u8,
        tx_power_index: u8,
        nb_trans: u8,
    },
    Disabled,
}

/// MAC settings of a device, a profile or the network
///
/// Plain fields are the values the device boots with; `desired_*` fields are
/// targets the network negotiates towards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacSettings {
    pub supports_class_c: Option<bool>,
    pub adr: Option<AdrMode>,

    pub rx1_delay: Option<u8>,
    pub desired_rx1_delay: Option<u8>,
    pub rx1_data_rate_offset: Option<u8>,
    pub desired_rx1_data_rate_offset: Option<u8>,
    pub rx2_data_rate_index: Option<u8>,
    pub desired_rx2_data_rate_index: Option<u8>,
    pub rx2_frequency: Option<u64>,
    pub desired_rx2_frequency: Option<u64>,

    pub max_duty_cycle: Option<u8>,
    pub desired_max_duty_cycle: Option<u8>,
    pub desired_adr_ack_limit_exponent: Option<u8>,
    pub desired_adr_ack_delay_exponent: Option<u8>,
    pub desired_rejoin_count_exponent: Option<u8>,
    pub desired_rejoin_time_exponent: Option<u8>,

    pub uplink_dwell_time: Option<bool>,
    pub desired_uplink_dwell_time: Option<bool>,
    pub downlink_dwell_time: Option<bool>,
    pub desired_downlink_dwell_time: Option<bool>,
    pub desired_max_eirp: Option<f32>,

    pub ping_slot_periodicity: Option<u8>,
    pub ping_slot_frequency: Option<u64>,
    pub desired_ping_slot_frequency: Option<u64>,
    pub ping_slot_data_rate_index: Option<u8>,
    pub desired_ping_slot_data_rate_index: Option<u8>,
    pub beacon_frequency: Option<u64>,
    pub desired_beacon_frequency: Option<u64>,

    pub status_count_periodicity: Option<u32>,
    /// Seconds
    pub status_time_periodicity: Option<u64>,

    /// Channels an ABP device is provisioned with beyond the band defaults
    pub factory_preset_frequencies: Option<Vec<u64>>,

    pub relay: Option<RelayParameters>,
    pub desired_relay: Option<RelayParameters>,
}

/// The two lowest-priority links of the settings chain
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub profile: Option<MacSettings>,
    #[serde(default)]
    pub global: MacSettings,
}

/// Device → profile → global lookup
pub struct SettingsChain<'a> {
    layers: [Option<&'a MacSettings>; 3],
}

impl<'a> SettingsChain<'a> {
    pub fn new(device: &'a MacSettings, defaults: &'a Defaults) -> Self {
        Self {
            layers: [Some(device), defaults.profile.as_ref(), Some(&defaults.global)],
        }
    }

    /// First value set along the chain
    pub fn get<T>(&self, f: impl Fn(&MacSettings) -> Option<T>) -> Option<T> {
        self.layers.iter().flatten().find_map(|s| f(s))
    }

    pub fn adr_mode(&self, phy: &Band) -> AdrMode {
        self.get(|s| s.adr.clone()).unwrap_or(if phy.supports_dynamic_adr {
            AdrMode::Dynamic { margin: None }
        } else {
            AdrMode::Disabled
        })
    }

    pub fn rx1_delay(&self) -> u8 {
        self.get(|s| s.rx1_delay).unwrap_or(DEFAULT_RX1_DELAY)
    }

    pub fn desired_rx1_delay(&self) -> u8 {
        self.get(|s| s.desired_rx1_delay)
            .unwrap_or_else(|| self.rx1_delay())
    }

    pub fn rx1_data_rate_offset(&self) -> u8 {
        self.get(|s| s.rx1_data_rate_offset).unwrap_or(0)
    }

    pub fn desired_rx1_data_rate_offset(&self) -> u8 {
        self.get(|s| s.desired_rx1_data_rate_offset)
            .unwrap_or_else(|| self.rx1_data_rate_offset())
    }

    pub fn rx2_data_rate_index(&self, phy: &Band) -> u8 {
        self.get(|s| s.rx2_data_rate_index)
            .unwrap_or(phy.default_rx2.data_rate_index)
    }

    pub fn desired_rx2_data_rate_index(&self, phy: &Band, plan: &FrequencyPlan) -> u8 {
        self.get(|s| s.desired_rx2_data_rate_index)
            .or(plan.rx2.map(|rx2| rx2.data_rate_index))
            .unwrap_or_else(|| self.rx2_data_rate_index(phy))
    }

    pub fn rx2_frequency(&self, phy: &Band) -> u64 {
        self.get(|s| s.rx2_frequency)
            .unwrap_or(phy.default_rx2.frequency)
    }

    pub fn desired_rx2_frequency(&self, phy: &Band, plan: &FrequencyPlan) -> u64 {
        self.get(|s| s.desired_rx2_frequency)
            .or(plan.rx2.map(|rx2| rx2.frequency))
            .unwrap_or_else(|| self.rx2_frequency(phy))
    }

    pub fn max_duty_cycle(&self) -> u8 {
        self.get(|s| s.max_duty_cycle).unwrap_or(0)
    }

    pub fn desired_max_duty_cycle(&self) -> u8 {
        self.get(|s| s.desired_max_duty_cycle)
            .unwrap_or_else(|| self.max_duty_cycle())
    }

    pub fn desired_adr_ack_limit_exponent(&self) -> u8 {
        self.get(|s| s.desired_adr_ack_limit_exponent)
            .unwrap_or(DEFAULT_ADR_ACK_LIMIT_EXPONENT)
    }

    pub fn desired_adr_ack_delay_exponent(&self) -> u8 {
        self.get(|s| s.desired_adr_ack_delay_exponent)
            .unwrap_or(DEFAULT_ADR_ACK_DELAY_EXPONENT)
    }

    pub fn desired_rejoin_count_exponent(&self) -> u8 {
        self.get(|s| s.desired_rejoin_count_exponent).unwrap_or(0)
    }

    pub fn desired_rejoin_time_exponent(&self) -> u8 {
        self.get(|s| s.desired_rejoin_time_exponent).unwrap_or(0)
    }

    /// `None` on bands where dwell time is not negotiable
    pub fn uplink_dwell_time(&self, phy: &Band) -> Option<bool> {
        if !phy.tx_param_setup_req_support {
            return None;
        }
        self.get(|s| s.uplink_dwell_time)
            .or(Some(phy.boot_uplink_dwell_time))
    }

    pub fn desired_uplink_dwell_time(&self, phy: &Band, plan: &FrequencyPlan) -> Option<bool> {
        if !phy.tx_param_setup_req_support {
            return None;
        }
        self.get(|s| s.desired_uplink_dwell_time)
            .or(plan.dwell_time.uplinks)
            .or_else(|| self.uplink_dwell_time(phy))
    }

    pub fn downlink_dwell_time(&self, phy: &Band) -> Option<bool> {
        if !phy.tx_param_setup_req_support {
            return None;
        }
        self.get(|s| s.downlink_dwell_time)
            .or(Some(phy.boot_downlink_dwell_time))
    }

    pub fn desired_downlink_dwell_time(&self, phy: &Band, plan: &FrequencyPlan) -> Option<bool> {
        if !phy.tx_param_setup_req_support {
            return None;
        }
        self.get(|s| s.desired_downlink_dwell_time)
            .or(plan.dwell_time.downlinks)
            .or_else(|| self.downlink_dwell_time(phy))
    }

    pub fn desired_max_eirp(&self, phy: &Band, plan: &FrequencyPlan) -> f32 {
        self.get(|s| s.desired_max_eirp)
            .or(plan.max_eirp)
            .unwrap_or(phy.default_max_eirp)
            .min(phy.default_max_eirp)
    }

    pub fn ping_slot_periodicity(&self) -> Option<u8> {
        self.get(|s| s.ping_slot_periodicity)
    }

    pub fn ping_slot_frequency(&self) -> u64 {
        self.get(|s| s.ping_slot_frequency).unwrap_or(0)
    }

    pub fn desired_ping_slot_frequency(&self, plan: &FrequencyPlan) -> u64 {
        self.get(|s| s.desired_ping_slot_frequency)
            .or(plan.ping_slot.and_then(|p| p.frequency))
            .unwrap_or_else(|| self.ping_slot_frequency())
    }

    pub fn ping_slot_data_rate_index(&self, phy: &Band) -> u8 {
        self.get(|s| s.ping_slot_data_rate_index)
            .unwrap_or(phy.default_ping_slot_data_rate_index)
    }

    pub fn desired_ping_slot_data_rate_index(&self, phy: &Band, plan: &FrequencyPlan) -> u8 {
        self.get(|s| s.desired_ping_slot_data_rate_index)
            .or(plan.ping_slot.and_then(|p| p.data_rate_index))
            .unwrap_or_else(|| self.ping_slot_data_rate_index(phy))
    }

    pub fn beacon_frequency(&self) -> u64 {
        self.get(|s| s.beacon_frequency).unwrap_or(0)
    }

    pub fn desired_beacon_frequency(&self, plan: &FrequencyPlan) -> u64 {
        self.get(|s| s.desired_beacon_frequency)
            .or(plan.beacon_frequency)
            .unwrap_or_else(|| self.beacon_frequency())
    }

    pub fn status_count_periodicity(&self) -> u32 {
        self.get(|s| s.status_count_periodicity)
            .unwrap_or(DEFAULT_STATUS_COUNT_PERIODICITY)
    }

    pub fn status_time_periodicity(&self) -> u64 {
        self.get(|s| s.status_time_periodicity)
            .unwrap_or(DEFAULT_STATUS_TIME_PERIODICITY)
    }

    pub fn relay(&self) -> Option<RelayParameters> {
        self.get(|s| s.relay.clone())
    }

    pub fn desired_relay(&self) -> Option<RelayParameters> {
        self.get(|s| s.desired_relay.clone()).or_else(|| self.relay())
    }

    pub fn device_class(&self, version: MacVersion) -> DeviceClass {
        if version.capabilities().implicit_class_c && self.get(|s| s.supports_class_c) == Some(true)
        {
            DeviceClass::C
        } else {
            DeviceClass::A
        }
    }
}

/// Parameters the device uses right after boot (ABP) or join (OTAA)
fn boot_parameters(dev: &EndDevice, chain: &SettingsChain, phy: &Band, plan: &FrequencyPlan) -> Result<MacParameters> {
    let mut channels = FrequencyPlan::band_channels(phy);
    if dev.supports_join {
        if let Some(cf_list) = plan.cf_list(phy)? {
            cf_list.apply(phy, &mut channels);
        }
    } else if let Some(freqs) = chain.get(|s| s.factory_preset_frequencies.clone()) {
        CfList::Frequencies(freqs).apply(phy, &mut channels);
    }

    let mut params = MacParameters {
        data_rate_index: phy
            .uplink_channels
            .first()
            .map_or(0, |c| c.min_data_rate_index),
        tx_power_index: 0,
        nb_trans: DEFAULT_NB_TRANS,
        rx1_delay: chain.rx1_delay(),
        rx1_data_rate_offset: chain.rx1_data_rate_offset(),
        rx2_data_rate_index: chain.rx2_data_rate_index(phy),
        rx2_frequency: chain.rx2_frequency(phy),
        max_duty_cycle: chain.max_duty_cycle(),
        adr_ack_limit_exponent: DEFAULT_ADR_ACK_LIMIT_EXPONENT,
        adr_ack_delay_exponent: DEFAULT_ADR_ACK_DELAY_EXPONENT,
        rejoin_count_exponent: 0,
        rejoin_time_exponent: 0,
        uplink_dwell_time: chain.uplink_dwell_time(phy),
        downlink_dwell_time: chain.downlink_dwell_time(phy),
        max_eirp: phy.default_max_eirp,
        ping_slot_frequency: chain.ping_slot_frequency(),
        ping_slot_data_rate_index: chain.ping_slot_data_rate_index(phy),
        beacon_frequency: chain.beacon_frequency(),
        relay: chain.relay(),
        channels,
    };
    if dev.supports_join {
        // The Join Accept carries RX1 delay and DLSettings
        params.rx1_delay = chain.desired_rx1_delay();
        params.rx1_data_rate_offset = chain.desired_rx1_data_rate_offset();
        params.rx2_data_rate_index = chain.desired_rx2_data_rate_index(phy, plan);
    }
    Ok(params)
}

/// Derive a fresh MAC state, as after a join or a reset
pub fn new_state(
    dev: &EndDevice,
    phy: &Band,
    plan: &FrequencyPlan,
    defaults: &Defaults,
) -> Result<MacState> {
    let chain = SettingsChain::new(&dev.mac_settings, defaults);
    let current = boot_parameters(dev, &chain, phy, plan)?;
    current.validate_channels(phy)?;

    let mut state = MacState {
        lorawan_version: dev.lorawan_version,
        device_class: chain.device_class(dev.lorawan_version),
        ping_slot_periodicity: chain.ping_slot_periodicity(),
        desired_parameters: current.clone(),
        current_parameters: current,
        ..Default::default()
    };
    set_desired_parameters(&mut state, &chain, phy, plan)?;
    debug!(
        "New MAC state for {} ({} channels, LoRaWAN {})",
        dev.device_id,
        state.current_parameters.channels.len(),
        dev.lorawan_version
    );
    Ok(state)
}

/// Recompute the desired parameters after an uplink
pub fn update_desired_parameters(
    dev: &mut EndDevice,
    phy: &Band,
    plan: &FrequencyPlan,
    defaults: &Defaults,
) -> Result<()> {
    let chain = SettingsChain::new(&dev.mac_settings, defaults);
    set_desired_parameters(&mut dev.mac_state, &chain, phy, plan)
}

fn set_desired_parameters(
    state: &mut MacState,
    chain: &SettingsChain,
    phy: &Band,
    plan: &FrequencyPlan,
) -> Result<()> {
    let current = &state.current_parameters;
    let mut channels = plan.desired_channels(phy)?;
    // Channels the plan no longer has are removed with a zero frequency
    while channels.len() < current.channels.len() {
        channels.push(Default::default());
    }

    let mut desired = MacParameters {
        data_rate_index: current.data_rate_index,
        tx_power_index: current.tx_power_index,
        nb_trans: current.nb_trans,
        rx1_delay: chain.desired_rx1_delay(),
        rx1_data_rate_offset: chain.desired_rx1_data_rate_offset(),
        rx2_data_rate_index: chain.desired_rx2_data_rate_index(phy, plan),
        rx2_frequency: chain.desired_rx2_frequency(phy, plan),
        max_duty_cycle: chain.desired_max_duty_cycle(),
        adr_ack_limit_exponent: chain.desired_adr_ack_limit_exponent(),
        adr_ack_delay_exponent: chain.desired_adr_ack_delay_exponent(),
        rejoin_count_exponent: chain.desired_rejoin_count_exponent(),
        rejoin_time_exponent: chain.desired_rejoin_time_exponent(),
        uplink_dwell_time: chain.desired_uplink_dwell_time(phy, plan),
        downlink_dwell_time: chain.desired_downlink_dwell_time(phy, plan),
        max_eirp: chain.desired_max_eirp(phy, plan),
        ping_slot_frequency: chain.desired_ping_slot_frequency(plan),
        ping_slot_data_rate_index: chain.desired_ping_slot_data_rate_index(phy, plan),
        beacon_frequency: chain.desired_beacon_frequency(plan),
        relay: chain.desired_relay(),
        channels,
    };
    desired.validate_channels(phy)?;

    if !state.device_adr_enabled() {
        debug!("ADR bit cleared by device, pinning data rate and power");
    } else {
        match chain.adr_mode(phy) {
            AdrMode::Static {
                data_rate_index,
                tx_power_index,
                nb_trans,
            } => {
                desired.data_rate_index = data_rate_index;
                desired.tx_power_index = tx_power_index;
                desired.nb_trans = nb_trans;
            }
            AdrMode::Dynamic { margin } => {
                adr::adapt_data_rate(
                    state,
                    &mut desired,
                    phy,
                    margin.unwrap_or(DEFAULT_ADR_MARGIN),
                );
            }
            AdrMode::Disabled => {}
        }
    }
    state.desired_parameters = desired;
    Ok(())
}
