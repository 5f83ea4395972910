//! NewChannelReq / NewChannelAns
//!
//! Only bands with a frequency CFList define channels over the air. Band
//! default channels are fixed; extra channels are created, modified or
//! deleted (zero frequency). Frequencies a device refused are not offered
//! again.

use tracing::{debug, warn};

use crate::band::{Band, CfListType};
use crate::error::{Corruption, MacError, Result};
use crate::lorawan::commands::{NewChannelAns, NewChannelReq, Request};
use crate::lorawan::{Cid, DownlinkCommand, UplinkCommand};
use crate::mac::enqueue::{enqueue_mac_command, Batch, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::{Channel, EndDevice};
use crate::mac::{take_request, MacContext};

/// Requests needed to turn the current channel list into the desired one
fn channel_requests(dev: &EndDevice, phy: &Band) -> Vec<NewChannelReq> {
    let state = &dev.mac_state;
    let current = &state.current_parameters.channels;
    state
        .desired_parameters
        .channels
        .iter()
        .enumerate()
        .skip(phy.uplink_channels.len())
        .filter(|(i, want)| {
            let differs = match current.get(*i) {
                Some(have) => {
                    have.uplink_frequency != want.uplink_frequency
                        || have.min_data_rate_index != want.min_data_rate_index
                        || have.max_data_rate_index != want.max_data_rate_index
                }
                None => want.uplink_frequency != 0,
            };
            differs && !state.rejected_frequencies.contains(&want.uplink_frequency)
        })
        .map(|(i, want)| NewChannelReq {
            channel_index: i as u8,
            frequency: want.uplink_frequency,
            min_data_rate_index: want.min_data_rate_index,
            max_data_rate_index: want.max_data_rate_index,
        })
        .collect()
}

pub fn device_needs_new_channel_req(dev: &EndDevice, phy: &Band) -> bool {
    !dev.multicast
        && phy.cf_list_type == CfListType::Frequencies
        && !dev.mac_state.has_pending(Cid::NewChannel)
        && !channel_requests(dev, phy).is_empty()
}

/// Enqueue as many NewChannelReq as fit; the rest follows in later downlinks
pub fn enqueue_new_channel_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_new_channel_req(dev, phy) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let reqs = channel_requests(dev, phy);
    enqueue_mac_command(
        Cid::NewChannel,
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

pub fn handle_new_channel_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&NewChannelAns>,
    phy: &Band,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: NewChannelReq = take_request(&mut dev.mac_state.pending_requests)?;
    let accepted = pld.frequency_ack && pld.data_rate_ack;
    let event = MacEvent::answer(accepted, UplinkCommand::NewChannelAns(pld.clone()));
    if !accepted {
        warn!(
            "{} rejected NewChannelReq for channel {} at {} Hz: {:?}",
            dev.device_id, req.channel_index, req.frequency, pld
        );
        if !pld.frequency_ack {
            dev.mac_state.rejected_frequencies.insert(req.frequency);
        }
        return Ok(vec![event]);
    }

    let index = req.channel_index as usize;
    if index >= phy.max_uplink_channels {
        return Err(Corruption::ChannelIndexOutOfRange {
            index,
            max: phy.max_uplink_channels,
        }
        .into());
    }
    let channels = &mut dev.mac_state.current_parameters.channels;
    if channels.len() <= index {
        channels.resize(index + 1, Channel::default());
    }
    channels[index] = Channel {
        uplink_frequency: req.frequency,
        downlink_frequency: req.frequency,
        min_data_rate_index: req.min_data_rate_index,
        max_data_rate_index: req.max_data_rate_index,
        enable_uplink: req.frequency != 0,
    };
    debug!(
        "{} set channel {} to {} Hz",
        dev.device_id, index, req.frequency
    );
    Ok(vec![event])
}
