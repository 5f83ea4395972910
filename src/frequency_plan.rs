//! Frequency plans
//!
//! A frequency plan narrows a band down to the channels a network actually
//! operates, and may override RX2, Class B and regulatory settings.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::band::{Band, CfListType, ChannelMask};
use crate::error::{MacError, Result};
use crate::mac::state::Channel;

/// Maximum number of frequencies a CFList can carry
pub const CF_LIST_FREQUENCIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChannel {
    pub frequency: u64,
    #[serde(default)]
    pub min_data_rate_index: u8,
    #[serde(default = "default_max_data_rate_index")]
    pub max_data_rate_index: u8,
    /// Downlink frequency if it differs from the uplink frequency
    #[serde(default)]
    pub downlink_frequency: Option<u64>,
}

fn default_max_data_rate_index() -> u8 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rx2Override {
    pub frequency: u64,
    pub data_rate_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingSlotOverride {
    pub frequency: Option<u64>,
    pub data_rate_index: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DwellTime {
    pub uplinks: Option<bool>,
    pub downlinks: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrequencyPlan {
    pub band_id: String,
    /// Enabled uplink channels; empty means the band defaults
    #[serde(default)]
    pub uplink_channels: Vec<PlanChannel>,
    /// 1-based sub-band of a fixed channel plan (eight 125 kHz channels and
    /// one 500 kHz channel)
    #[serde(default)]
    pub sub_band: Option<u8>,
    #[serde(default)]
    pub rx2: Option<Rx2Override>,
    #[serde(default)]
    pub ping_slot: Option<PingSlotOverride>,
    #[serde(default)]
    pub beacon_frequency: Option<u64>,
    /// dBm
    #[serde(default)]
    pub max_eirp: Option<f32>,
    #[serde(default)]
    pub dwell_time: DwellTime,
}

/// Factory preset channels sent in a Join Accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfList {
    Frequencies(Vec<u64>),
    ChannelMasks(Vec<ChannelMask>),
}

impl CfList {
    /// 16-byte CFList field, last byte is CFListType
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(16);
        match self {
            CfList::Frequencies(freqs) => {
                for &f in freqs.iter().take(CF_LIST_FREQUENCIES) {
                    if f % 100 != 0 || f / 100 > 0xFF_FFFF {
                        return Err(MacError::Encoding(format!(
                            "CFList frequency {} Hz cannot be encoded",
                            f
                        )));
                    }
                    buf.put_uint_le(f / 100, 3);
                }
                buf.put_bytes(0, 15 - buf.len());
                buf.put_u8(0);
            }
            CfList::ChannelMasks(masks) => {
                for mask in masks.iter().take(5) {
                    buf.put_u16_le(mask.0);
                }
                buf.put_bytes(0, 15 - buf.len());
                buf.put_u8(1);
            }
        }
        Ok(buf.freeze())
    }

    /// Apply the CFList to the band's default channels, as a device does on join
    pub fn apply(&self, phy: &Band, channels: &mut Vec<Channel>) {
        match self {
            CfList::Frequencies(freqs) => {
                let extra_min = phy.uplink_channels.first().map_or(0, |c| c.min_data_rate_index);
                let extra_max = phy.uplink_channels.first().map_or(0, |c| c.max_data_rate_index);
                for &f in freqs.iter().take(CF_LIST_FREQUENCIES) {
                    if channels.len() >= phy.max_uplink_channels {
                        break;
                    }
                    channels.push(Channel {
                        uplink_frequency: f,
                        downlink_frequency: f,
                        min_data_rate_index: extra_min,
                        max_data_rate_index: extra_max,
                        enable_uplink: f != 0,
                    });
                }
            }
            CfList::ChannelMasks(masks) => {
                for (block, mask) in masks.iter().enumerate() {
                    for bit in 0..16 {
                        if let Some(ch) = channels.get_mut(block * 16 + bit) {
                            ch.enable_uplink = mask.is_enabled(bit);
                        }
                    }
                }
            }
        }
    }
}

impl FrequencyPlan {
    pub fn new(band_id: &str) -> Self {
        Self {
            band_id: band_id.to_string(),
            ..Default::default()
        }
    }

    /// The band's default channels, all enabled
    pub fn band_channels(phy: &Band) -> Vec<Channel> {
        phy.uplink_channels
            .iter()
            .enumerate()
            .map(|(i, ch)| Channel {
                uplink_frequency: ch.frequency,
                downlink_frequency: downlink_frequency(phy, i, ch.frequency),
                min_data_rate_index: ch.min_data_rate_index,
                max_data_rate_index: ch.max_data_rate_index,
                enable_uplink: true,
            })
            .collect()
    }

    /// Channel list the network wants the device to use
    pub fn desired_channels(&self, phy: &Band) -> Result<Vec<Channel>> {
        let mut channels = Self::band_channels(phy);
        match phy.cf_list_type {
            CfListType::Frequencies => {
                for plan_ch in &self.uplink_channels {
                    match channels
                        .iter_mut()
                        .find(|c| c.uplink_frequency == plan_ch.frequency)
                    {
                        Some(ch) => {
                            if let Some(dl) = plan_ch.downlink_frequency {
                                ch.downlink_frequency = dl;
                            }
                        }
                        None => channels.push(Channel {
                            uplink_frequency: plan_ch.frequency,
                            downlink_frequency: plan_ch
                                .downlink_frequency
                                .unwrap_or(plan_ch.frequency),
                            min_data_rate_index: plan_ch.min_data_rate_index,
                            max_data_rate_index: plan_ch.max_data_rate_index,
                            enable_uplink: true,
                        }),
                    }
                }
                if !self.uplink_channels.is_empty() {
                    // Default channels stay defined but may be switched off
                    for ch in channels.iter_mut() {
                        ch.enable_uplink = self
                            .uplink_channels
                            .iter()
                            .any(|p| p.frequency == ch.uplink_frequency);
                    }
                }
            }
            CfListType::ChannelMasks => {
                let enabled = self.fixed_enabled(phy, &channels)?;
                for (ch, on) in channels.iter_mut().zip(enabled) {
                    ch.enable_uplink = on;
                }
            }
        }
        if channels.len() > phy.max_uplink_channels {
            return Err(MacError::InvalidFrequencyPlan(format!(
                "{} channels exceed the {} maximum of {}",
                channels.len(),
                phy.id,
                phy.max_uplink_channels
            )));
        }
        Ok(channels)
    }

    fn fixed_enabled(&self, phy: &Band, channels: &[Channel]) -> Result<Vec<bool>> {
        if let Some(sub_band) = self.sub_band {
            if !(1..=8).contains(&sub_band) {
                return Err(MacError::InvalidFrequencyPlan(format!(
                    "sub-band {} outside 1..=8",
                    sub_band
                )));
            }
            let first = (sub_band as usize - 1) * 8;
            return Ok((0..channels.len())
                .map(|i| (first..first + 8).contains(&i) || i == 64 + sub_band as usize - 1)
                .collect());
        }
        if self.uplink_channels.is_empty() {
            return Ok(vec![true; channels.len()]);
        }
        let mut enabled = vec![false; channels.len()];
        for plan_ch in &self.uplink_channels {
            let index = channels
                .iter()
                .position(|c| c.uplink_frequency == plan_ch.frequency)
                .ok_or_else(|| {
                    MacError::InvalidFrequencyPlan(format!(
                        "{} Hz is not a {} channel",
                        plan_ch.frequency, phy.id
                    ))
                })?;
            enabled[index] = true;
        }
        Ok(enabled)
    }

    /// CFList for a Join Accept, if the plan differs from the band defaults
    pub fn cf_list(&self, phy: &Band) -> Result<Option<CfList>> {
        let desired = self.desired_channels(phy)?;
        match phy.cf_list_type {
            CfListType::Frequencies => {
                let extra: Vec<u64> = desired
                    .iter()
                    .skip(phy.uplink_channels.len())
                    .map(|c| c.uplink_frequency)
                    .take(CF_LIST_FREQUENCIES)
                    .collect();
                Ok((!extra.is_empty()).then_some(CfList::Frequencies(extra)))
            }
            CfListType::ChannelMasks => {
                if desired.iter().all(|c| c.enable_uplink) {
                    return Ok(None);
                }
                let statuses: Vec<bool> = desired.iter().map(|c| c.enable_uplink).collect();
                let masks = statuses.chunks(16).map(ChannelMask::from_statuses).collect();
                Ok(Some(CfList::ChannelMasks(masks)))
            }
        }
    }
}

/// Downlink frequency of uplink channel `index`; fixed plans map every
/// uplink channel onto one of the downlink channels
fn downlink_frequency(phy: &Band, index: usize, uplink_frequency: u64) -> u64 {
    match phy.cf_list_type {
        CfListType::Frequencies => uplink_frequency,
        CfListType::ChannelMasks => phy
            .downlink_channels
            .get(index % phy.downlink_channels.len().max(1))
            .map_or(uplink_frequency, |c| c.frequency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;

    fn eu868_plan() -> FrequencyPlan {
        let freqs = [
            868_100_000,
            868_300_000,
            868_500_000,
            867_100_000,
            867_300_000,
            867_500_000,
            867_700_000,
            867_900_000,
        ];
        FrequencyPlan {
            uplink_channels: freqs
                .iter()
                .map(|&frequency| PlanChannel {
                    frequency,
                    min_data_rate_index: 0,
                    max_data_rate_index: 5,
                    downlink_frequency: None,
                })
                .collect(),
            ..FrequencyPlan::new("EU_863_870")
        }
    }

    #[test]
    fn test_eu868_desired_channels_append_extra() {
        let phy = band::by_id("EU_863_870").unwrap();
        let channels = eu868_plan().desired_channels(phy).unwrap();
        assert_eq!(channels.len(), 8);
        assert!(channels.iter().all(|c| c.enable_uplink));
        assert_eq!(channels[3].uplink_frequency, 867_100_000);
        assert_eq!(channels[3].downlink_frequency, 867_100_000);
    }

    #[test]
    fn test_eu868_cf_list() {
        let phy = band::by_id("EU_863_870").unwrap();
        let cf_list = eu868_plan().cf_list(phy).unwrap().unwrap();
        let CfList::Frequencies(freqs) = &cf_list else {
            panic!("expected frequency CFList");
        };
        assert_eq!(freqs.len(), 5);
        let bytes = cf_list.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..3], &[0x18, 0x4F, 0x84]);
        assert_eq!(bytes[15], 0);

        let mut channels = FrequencyPlan::band_channels(phy);
        cf_list.apply(phy, &mut channels);
        assert_eq!(channels, eu868_plan().desired_channels(phy).unwrap());
    }

    #[test]
    fn test_us915_sub_band() {
        let phy = band::by_id("US_902_928").unwrap();
        let plan = FrequencyPlan {
            sub_band: Some(2),
            ..FrequencyPlan::new("US_902_928")
        };
        let channels = plan.desired_channels(phy).unwrap();
        let enabled: Vec<usize> = (0..72).filter(|&i| channels[i].enable_uplink).collect();
        assert_eq!(enabled, vec![8, 9, 10, 11, 12, 13, 14, 15, 65]);
        assert_eq!(channels[9].downlink_frequency, 923_900_000);

        let cf_list = plan.cf_list(phy).unwrap().unwrap();
        let mut current = FrequencyPlan::band_channels(phy);
        cf_list.apply(phy, &mut current);
        assert_eq!(current, channels);
        assert_eq!(cf_list.to_bytes().unwrap()[15], 1);
    }

    #[test]
    fn test_fixed_plan_rejects_unknown_frequency() {
        let phy = band::by_id("US_902_928").unwrap();
        let plan = FrequencyPlan {
            uplink_channels: vec![PlanChannel {
                frequency: 868_100_000,
                min_data_rate_index: 0,
                max_data_rate_index: 3,
                downlink_frequency: None,
            }],
            ..FrequencyPlan::new("US_902_928")
        };
        assert!(matches!(
            plan.desired_channels(phy),
            Err(MacError::InvalidFrequencyPlan(_))
        ));
    }
}
