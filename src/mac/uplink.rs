//! Uplink processing
//!
//! [`handle_uplink`] applies every MAC command of a frame to a staged copy of
//! the device and commits the copy only if the whole frame is valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::{DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::settings::update_desired_parameters;
use crate::mac::state::{EndDevice, UplinkRecord};
use crate::mac::{
    adr_param_setup, beacon_freq, dev_status, device_mode, device_time, dl_channel, duty_cycle,
    link_adr, link_check, new_channel, ping_slot_channel, ping_slot_info, rejoin_param_setup,
    rekey, relay_conf, relay_end_device_conf, relay_update_uplink_list, reset, rx_param_setup,
    rx_timing_setup, tx_param_setup, MacContext,
};

/// Reception of an uplink by one gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxMetadata {
    pub gateway_id: String,
    /// dB
    pub snr: f32,
    /// dBm
    pub rssi: i16,
}

/// A decoded uplink frame as seen by the MAC layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uplink {
    pub f_cnt: u32,
    /// ADR bit of the frame header
    pub adr: bool,
    pub data_rate_index: u8,
    pub frequency: u64,
    pub rx_metadata: Vec<RxMetadata>,
    pub received_at: DateTime<Utc>,
    /// MAC commands in frame order
    pub mac_commands: Vec<UplinkCommand>,
}

impl Uplink {
    /// Best SNR over all gateways
    pub fn max_snr(&self) -> Option<f32> {
        self.rx_metadata
            .iter()
            .map(|md| md.snr)
            .reduce(f32::max)
    }

    /// Number of distinct gateways that received the frame
    pub fn gateway_count(&self) -> usize {
        let mut ids: Vec<&str> = self.rx_metadata.iter().map(|md| md.gateway_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Handle one MAC command; `dup_count` only applies to LinkADRAns
fn handle_command(
    ctx: &MacContext,
    dev: &mut EndDevice,
    cmd: &UplinkCommand,
    dup_count: u32,
    up: &Uplink,
    phy: &Band,
) -> Result<Vec<MacEvent>> {
    match cmd {
        UplinkCommand::ResetInd(pld) => reset::handle_reset_ind(ctx, dev, Some(pld), phy),
        UplinkCommand::LinkCheckReq(pld) => {
            link_check::handle_link_check_req(ctx, dev, Some(pld), up, phy)
        }
        UplinkCommand::LinkAdrAns(pld) => {
            link_adr::handle_link_adr_ans(ctx, dev, Some(pld), dup_count, up.f_cnt, phy)
        }
        UplinkCommand::DutyCycleAns(pld) => duty_cycle::handle_duty_cycle_ans(ctx, dev, Some(pld)),
        UplinkCommand::RxParamSetupAns(pld) => {
            rx_param_setup::handle_rx_param_setup_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::DevStatusAns(pld) => {
            dev_status::handle_dev_status_ans(ctx, dev, Some(pld), up.f_cnt)
        }
        UplinkCommand::NewChannelAns(pld) => {
            new_channel::handle_new_channel_ans(ctx, dev, Some(pld), phy)
        }
        UplinkCommand::RxTimingSetupAns(pld) => {
            rx_timing_setup::handle_rx_timing_setup_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::TxParamSetupAns(pld) => {
            tx_param_setup::handle_tx_param_setup_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::DlChannelAns(pld) => dl_channel::handle_dl_channel_ans(ctx, dev, Some(pld)),
        UplinkCommand::RekeyInd(pld) => rekey::handle_rekey_ind(ctx, dev, Some(pld)),
        UplinkCommand::AdrParamSetupAns(pld) => {
            adr_param_setup::handle_adr_param_setup_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::DeviceTimeReq(pld) => {
            device_time::handle_device_time_req(ctx, dev, Some(pld))
        }
        UplinkCommand::RejoinParamSetupAns(pld) => {
            rejoin_param_setup::handle_rejoin_param_setup_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::PingSlotInfoReq(pld) => {
            ping_slot_info::handle_ping_slot_info_req(ctx, dev, Some(pld))
        }
        UplinkCommand::PingSlotChannelAns(pld) => {
            ping_slot_channel::handle_ping_slot_channel_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::BeaconFreqAns(pld) => {
            beacon_freq::handle_beacon_freq_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::DeviceModeInd(pld) => {
            device_mode::handle_device_mode_ind(ctx, dev, Some(pld))
        }
        UplinkCommand::RelayConfAns(pld) => relay_conf::handle_relay_conf_ans(ctx, dev, Some(pld)),
        UplinkCommand::RelayEndDeviceConfAns(pld) => {
            relay_end_device_conf::handle_relay_end_device_conf_ans(ctx, dev, Some(pld))
        }
        UplinkCommand::RelayUpdateUplinkListAns(pld) => {
            relay_update_uplink_list::handle_relay_update_uplink_list_ans(ctx, dev, Some(pld))
        }
    }
}

/// Apply an uplink frame to the device
///
/// Commands are handled in frame order. Identical LinkADRAns following each
/// other are one answer repeated for a block of requests. Requests still
/// pending after the frame were lost and are dropped; the next downlink cycle
/// sends them again if they are still needed. On error the device is left
/// untouched.
pub fn handle_uplink(
    ctx: &MacContext,
    dev: &mut EndDevice,
    up: &Uplink,
    phy: &Band,
) -> Result<Vec<MacEvent>> {
    let mut staged = dev.clone();
    let mut events = Vec::new();

    // Responses queued for the previous downlink are obsolete once the
    // device transmits again
    staged.mac_state.queued_responses.clear();

    let cmds = &up.mac_commands;
    let mut i = 0;
    while i < cmds.len() {
        let cmd = &cmds[i];
        let mut dup_count = 0;
        if let UplinkCommand::LinkAdrAns(ans) = cmd {
            while let Some(UplinkCommand::LinkAdrAns(next)) = cmds.get(i + 1) {
                if next != ans {
                    return Err(MacError::InvalidPayload(
                        "non-identical LinkADRAns in one frame".to_string(),
                    ));
                }
                dup_count += 1;
                i += 1;
            }
        }
        debug!("{} handling {}", staged.device_id, cmd.cid());
        events.extend(handle_command(ctx, &mut staged, cmd, dup_count, up, phy)?);
        i += 1;
    }

    let dropped: Vec<DownlinkCommand> = staged.mac_state.pending_requests.drain(..).collect();
    if !dropped.is_empty() {
        let cids = dropped.iter().map(DownlinkCommand::cid).collect::<Vec<_>>();
        warn!(
            "{} left {} requests unanswered: {:?}",
            staged.device_id,
            cids.len(),
            cids
        );
        events.push(MacEvent::DropRequests { cids });
    }

    match up.max_snr() {
        Some(max_snr) => staged.mac_state.record_uplink(UplinkRecord {
            f_cnt: up.f_cnt,
            data_rate_index: up.data_rate_index,
            adr: up.adr,
            max_snr,
            gateway_count: up.gateway_count().min(u8::MAX as usize) as u8,
            received_at: up.received_at,
        }),
        None => debug!("{} uplink {} has no reception metadata", staged.device_id, up.f_cnt),
    }
    staged.session.last_f_cnt_up = up.f_cnt;
    update_desired_parameters(&mut staged, phy, ctx.frequency_plan, ctx.defaults)?;

    *dev = staged;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::commands::{
        DevStatusAns, DevStatusReq, DutyCycleAns, DutyCycleReq, LinkAdrAns, LinkCheckReq,
    };
    use crate::lorawan::{Cid, MacVersion};
    use crate::mac::test_util::TestEnv;

    fn uplink(env: &TestEnv, f_cnt: u32, mac_commands: Vec<UplinkCommand>) -> Uplink {
        Uplink {
            f_cnt,
            adr: true,
            data_rate_index: 0,
            frequency: 868_100_000,
            rx_metadata: vec![RxMetadata {
                gateway_id: "gw-1".to_string(),
                snr: -5.0,
                rssi: -100,
            }],
            received_at: env.now,
            mac_commands,
        }
    }

    #[test]
    fn test_answers_in_frame_order() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.pending_requests = vec![
            DownlinkCommand::DutyCycleReq(DutyCycleReq { max_duty_cycle: 3 }),
            DownlinkCommand::DevStatusReq(DevStatusReq),
        ];
        let up = uplink(
            &env,
            7,
            vec![
                UplinkCommand::DutyCycleAns(DutyCycleAns),
                UplinkCommand::DevStatusAns(DevStatusAns {
                    battery: 0,
                    margin: 5,
                }),
                UplinkCommand::LinkCheckReq(LinkCheckReq),
            ],
        );
        let evs = handle_uplink(&env.ctx(), &mut dev, &up, phy).unwrap();
        assert_eq!(
            evs.iter().map(MacEvent::name).collect::<Vec<_>>(),
            vec![
                "receive_accept",
                "receive_accept",
                "receive_indication",
                "enqueue_response"
            ]
        );
        assert_eq!(dev.mac_state.current_parameters.max_duty_cycle, 3);
        assert_eq!(dev.session.last_f_cnt_up, 7);
        assert_eq!(dev.mac_state.last_dev_status_f_cnt_up, 7);
        assert_eq!(dev.mac_state.recent_uplinks.len(), 1);
        assert_eq!(dev.mac_state.queued_responses.len(), 1);
    }

    #[test]
    fn test_unanswered_requests_are_dropped() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.pending_requests = vec![DownlinkCommand::DevStatusReq(DevStatusReq)];
        let evs = handle_uplink(&env.ctx(), &mut dev, &uplink(&env, 1, Vec::new()), phy).unwrap();
        assert_eq!(
            evs,
            vec![MacEvent::DropRequests {
                cids: vec![Cid::DevStatus]
            }]
        );
        assert!(dev.mac_state.pending_requests.is_empty());
    }

    #[test]
    fn test_failed_frame_leaves_device_untouched() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.pending_requests = vec![DownlinkCommand::DutyCycleReq(DutyCycleReq {
            max_duty_cycle: 3,
        })];
        let before = dev.clone();
        // The second answer has no request to match
        let up = uplink(
            &env,
            2,
            vec![
                UplinkCommand::DutyCycleAns(DutyCycleAns),
                UplinkCommand::DutyCycleAns(DutyCycleAns),
            ],
        );
        let res = handle_uplink(&env.ctx(), &mut dev, &up, phy);
        assert!(matches!(res, Err(MacError::RequestNotFound { cid: Cid::DutyCycle })));
        assert_eq!(dev, before);
    }

    #[test]
    fn test_non_identical_link_adr_answers() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_2, phy);
        let ack = |dr| {
            UplinkCommand::LinkAdrAns(LinkAdrAns {
                channel_mask_ack: true,
                data_rate_index_ack: dr,
                tx_power_index_ack: true,
            })
        };
        let up = uplink(&env, 3, vec![ack(true), ack(false)]);
        assert!(matches!(
            handle_uplink(&env.ctx(), &mut dev, &up, phy),
            Err(MacError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_max_snr_and_gateway_count() {
        let env = TestEnv::new("EU_863_870");
        let mut up = uplink(&env, 1, Vec::new());
        up.rx_metadata.push(RxMetadata {
            gateway_id: "gw-2".to_string(),
            snr: 7.5,
            rssi: -80,
        });
        up.rx_metadata.push(RxMetadata {
            gateway_id: "gw-1".to_string(),
            snr: 1.0,
            rssi: -95,
        });
        assert_eq!(up.max_snr(), Some(7.5));
        assert_eq!(up.gateway_count(), 2);
        up.rx_metadata.clear();
        assert_eq!(up.max_snr(), None);
    }
}
