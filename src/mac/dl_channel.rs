//! DlChannelReq / DlChannelAns
//!
//! Moves the RX1 downlink frequency of an existing channel away from its
//! uplink frequency. The answer is sticky like RXParamSetupAns.

use tracing::{debug, warn};

use crate::band::{Band, CfListType};
use crate::error::{Corruption, MacError, Result};
use crate::lorawan::commands::{DlChannelAns, DlChannelReq, Request};
use crate::lorawan::{Cid, DownlinkCommand, UplinkCommand};
use crate::mac::enqueue::{enqueue_mac_command, Batch, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, take_request_opt, MacContext};

fn channel_requests(dev: &EndDevice) -> Vec<DlChannelReq> {
    let current = &dev.mac_state.current_parameters.channels;
    dev.mac_state
        .desired_parameters
        .channels
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (want, have))| {
            have.uplink_frequency != 0
                && want.uplink_frequency == have.uplink_frequency
                && want.downlink_frequency != 0
                && want.downlink_frequency != have.downlink_frequency
        })
        .map(|(i, (want, _))| DlChannelReq {
            channel_index: i as u8,
            frequency: want.downlink_frequency,
        })
        .collect()
}

pub fn device_needs_dl_channel_req(dev: &EndDevice, phy: &Band) -> bool {
    !dev.multicast
        && dev.mac_state.lorawan_version.capabilities().dl_channel
        && phy.cf_list_type == CfListType::Frequencies
        && !dev.mac_state.has_pending(Cid::DlChannel)
        && !channel_requests(dev).is_empty()
}

pub fn enqueue_dl_channel_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_dl_channel_req(dev, phy) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let reqs = channel_requests(dev);
    enqueue_mac_command(
        Cid::DlChannel,
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        |n_down, n_up| {
            let n = n_down.min(n_up) as usize;
            let ok = n >= reqs.len();
            let commands: Vec<DownlinkCommand> = reqs
                .into_iter()
                .take(n)
                .map(Request::into_command)
                .collect();
            let events = commands
                .iter()
                .map(|command| MacEvent::EnqueueRequest {
                    command: command.clone(),
                })
                .collect();
            Ok(Batch {
                uplinks_needed: commands.len() as u16,
                commands,
                events,
                ok,
            })
        },
    )
}

pub fn handle_dl_channel_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&DlChannelAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let pending = &mut dev.mac_state.pending_requests;
    let req: DlChannelReq = if dev.mac_state.lorawan_version.capabilities().sticky_answers {
        match take_request_opt(pending)? {
            Some(req) => req,
            None => {
                debug!("Repeated DlChannelAns from {}", dev.device_id);
                return Ok(Vec::new());
            }
        }
    } else {
        take_request(pending)?
    };

    let accepted = pld.channel_index_ack && pld.frequency_ack;
    if !accepted {
        warn!(
            "{} rejected DlChannelReq for channel {}: {:?}",
            dev.device_id, req.channel_index, pld
        );
    } else {
        let channels = &mut dev.mac_state.current_parameters.channels;
        let channels_len = channels.len();
        let index = req.channel_index as usize;
        let ch = channels
            .get_mut(index)
            .ok_or(Corruption::UndefinedChannel {
                index,
                channels_len,
            })?;
        ch.downlink_frequency = req.frequency;
    }
    Ok(vec![MacEvent::answer(
        accepted,
        UplinkCommand::DlChannelAns(pld.clone()),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    #[test]
    fn test_downlink_frequency_update() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.desired_parameters.channels[1].downlink_frequency = 869_100_000;
        assert!(device_needs_dl_channel_req(&dev, phy));

        enqueue_dl_channel_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert_eq!(
            dev.mac_state.pending_requests,
            vec![DownlinkCommand::DlChannelReq(DlChannelReq {
                channel_index: 1,
                frequency: 869_100_000,
            })]
        );
        let ans = DlChannelAns {
            channel_index_ack: true,
            frequency_ack: true,
        };
        handle_dl_channel_ans(&env.ctx(), &mut dev, Some(&ans)).unwrap();
        assert_eq!(
            dev.mac_state.current_parameters.channels[1].downlink_frequency,
            869_100_000
        );
        assert!(!device_needs_dl_channel_req(&dev, phy));
    }

    #[test]
    fn test_not_available_before_1_0_2() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_1, phy);
        dev.mac_state.desired_parameters.channels[1].downlink_frequency = 869_100_000;
        assert!(!device_needs_dl_channel_req(&dev, phy));
    }

    #[test]
    fn test_answer_for_unknown_channel_is_corruption() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state
            .pending_requests
            .push(DownlinkCommand::DlChannelReq(DlChannelReq {
                channel_index: 9,
                frequency: 869_100_000,
            }));
        let ans = DlChannelAns {
            channel_index_ack: true,
            frequency_ack: true,
        };
        assert!(matches!(
            handle_dl_channel_ans(&env.ctx(), &mut dev, Some(&ans)),
            Err(MacError::CorruptedMacState(Corruption::UndefinedChannel {
                index: 9,
                channels_len: 3
            }))
        ));
    }
}
