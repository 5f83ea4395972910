//! LinkADRReq / LinkADRAns
//!
//! Channel masks, data rate, Tx power and NbTrans are negotiated together.
//! The device applies a block of LinkADRReq atomically: one negative ack
//! rejects the whole block. Rejected data rates and Tx powers are remembered
//! and never offered again; the negotiation descends to slower data rates at
//! full power until it finds a pair the device has not refused.

use tracing::{debug, warn};

use crate::band::{Band, ChMaskPair};
use crate::error::{Corruption, MacError, Result};
use crate::lorawan::commands::{LinkAdrAns, LinkAdrReq, Request};
use crate::lorawan::{Cid, DownlinkCommand, UplinkCommand};
use crate::mac::enqueue::{enqueue_mac_command, Batch, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::{EndDevice, MacState};
use crate::mac::{take_request_block, MacContext};

/// Highest NbTrans a LinkADRReq can carry
pub const MAX_NB_TRANS: u8 = 15;

/// Parameters of the next LinkADRReq block
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAdrParams {
    pub masks: Vec<ChMaskPair>,
    pub data_rate_index: u8,
    pub tx_power_index: u8,
    pub nb_trans: u8,
}

/// Current and desired uplink enable flags over the longer of both lists
///
/// Channels still waiting for a NewChannelAns count as enabled in the
/// current bitmap once they have a frequency, since the device processes the
/// NewChannelReq before the LinkADRReq of the same downlink.
fn channel_bitmaps(state: &MacState) -> (Vec<bool>, Vec<bool>) {
    let current = &state.current_parameters.channels;
    let desired = &state.desired_parameters.channels;
    let mut len = current.len().max(desired.len());
    for req in state.pending_new_channels() {
        len = len.max(req.channel_index as usize + 1);
    }
    let mut current_bits: Vec<bool> = (0..len)
        .map(|i| current.get(i).map_or(false, |ch| ch.enable_uplink))
        .collect();
    for req in state.pending_new_channels() {
        current_bits[req.channel_index as usize] = req.frequency != 0;
    }
    let desired_bits = (0..len)
        .map(|i| desired.get(i).map_or(false, |ch| ch.enable_uplink))
        .collect();
    (current_bits, desired_bits)
}

/// Compute the next LinkADRReq block, `None` if nothing needs to change
pub fn generate_link_adr_req(dev: &EndDevice, phy: &Band) -> Result<Option<LinkAdrParams>> {
    let state = &dev.mac_state;
    let caps = state.lorawan_version.capabilities();
    let current = &state.current_parameters;
    let desired = &state.desired_parameters;

    current.validate_channels(phy)?;
    desired.validate_channels(phy)?;
    let (current_bits, desired_bits) = channel_bitmaps(state);
    if current_bits.len() > phy.max_uplink_channels {
        return Err(Corruption::TooManyChannels {
            len: current_bits.len(),
            max: phy.max_uplink_channels,
        }
        .into());
    }
    let masks_changed = current_bits != desired_bits;

    let (min_dr, max_dr) = desired.allowed_data_rate_range()?;
    if !(min_dr..=max_dr).contains(&desired.data_rate_index) {
        return Err(Corruption::DataRateOutOfRange {
            index: desired.data_rate_index,
            min: min_dr,
            max: max_dr,
        }
        .into());
    }
    if phy.data_rate(desired.data_rate_index).is_none() {
        return Err(Corruption::UnknownDataRate {
            index: desired.data_rate_index,
        }
        .into());
    }
    if desired.tx_power_index > phy.max_tx_power_index() {
        return Err(Corruption::TxPowerOutOfRange {
            index: desired.tx_power_index,
            max: phy.max_tx_power_index(),
        }
        .into());
    }
    if !(1..=MAX_NB_TRANS).contains(&desired.nb_trans) {
        return Err(Corruption::InvalidNbTrans {
            nb_trans: desired.nb_trans,
        }
        .into());
    }

    let rejected_dr = |i: u8| state.rejected_adr_data_rate_indexes.contains(&i);
    let rejected_power = |i: u8| state.rejected_adr_tx_power_indexes.contains(&i);

    let (mut dr, mut power, nb_trans) = if state.device_adr_enabled() {
        (desired.data_rate_index, desired.tx_power_index, desired.nb_trans)
    } else {
        (current.data_rate_index, current.tx_power_index, current.nb_trans)
    };
    if state.device_adr_enabled() {
        while dr > min_dr && (rejected_dr(dr) || rejected_power(power)) {
            match (min_dr..dr).rev().find(|&i| phy.data_rate(i).is_some()) {
                Some(lower) => {
                    dr = lower;
                    power = 0;
                }
                None => break,
            }
        }
        if rejected_dr(dr) || rejected_power(power) {
            debug!(
                "No acceptable data rate above DR{} for {}, keeping current",
                min_dr, dev.device_id
            );
            dr = current.data_rate_index;
            power = current.tx_power_index;
        }
    }

    if !masks_changed
        && dr == current.data_rate_index
        && power == current.tx_power_index
        && nb_trans == current.nb_trans
    {
        return Ok(None);
    }

    if dr == current.data_rate_index {
        if let Some(no_change) = caps.no_change_data_rate_index {
            if !rejected_dr(no_change) {
                dr = no_change;
            }
        }
    }
    if power == current.tx_power_index {
        if let Some(no_change) = caps.no_change_tx_power_index {
            if !rejected_power(no_change) {
                power = no_change;
            }
        }
    }

    let masks = phy.generate_ch_masks(&current_bits, &desired_bits, caps.bank_channel_masks)?;
    Ok(Some(LinkAdrParams {
        masks,
        data_rate_index: dr,
        tx_power_index: power,
        nb_trans,
    }))
}

pub fn device_needs_link_adr_req(dev: &EndDevice, phy: &Band) -> bool {
    if dev.multicast || dev.mac_state.has_pending(Cid::LinkAdr) {
        return false;
    }
    // Errors surface from the enqueue
    !matches!(generate_link_adr_req(dev, phy), Ok(None))
}

pub fn enqueue_link_adr_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_link_adr_req(dev, phy) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let Some(params) = generate_link_adr_req(dev, phy)? else {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    };
    let per_request = dev.mac_state.lorawan_version.capabilities().link_adr_ans_per_request;
    let pending = &mut dev.mac_state.pending_requests;
    enqueue_mac_command(Cid::LinkAdr, max_down_len, max_up_len, pending, |n_down, n_up| {
        let uplinks_needed = if per_request { params.masks.len() as u16 } else { 1 };
        if params.masks.len() as u16 > n_down || uplinks_needed > n_up {
            return Ok(Batch::deferred());
        }
        let commands: Vec<DownlinkCommand> = params
            .masks
            .iter()
            .map(|pair| {
                LinkAdrReq {
                    data_rate_index: params.data_rate_index,
                    tx_power_index: params.tx_power_index,
                    channel_mask: pair.mask.0,
                    channel_mask_control: pair.control,
                    nb_trans: params.nb_trans,
                }
                .into_command()
            })
            .collect();
        let events = commands
            .iter()
            .map(|command| MacEvent::EnqueueRequest {
                command: command.clone(),
            })
            .collect();
        Ok(Batch {
            commands,
            uplinks_needed,
            events,
            ok: true,
        })
    })
}

/// Handle a LinkADRAns, `dup_count` identical answers having been folded
/// into it
pub fn handle_link_adr_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&LinkAdrAns>,
    dup_count: u32,
    f_cnt_up: u32,
    phy: &Band,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let caps = dev.mac_state.lorawan_version.capabilities();
    if dup_count != 0 && !caps.link_adr_ans_per_request {
        return Err(MacError::InvalidPayload(format!(
            "{} duplicate LinkADRAns from LoRaWAN {} device",
            dup_count, dev.mac_state.lorawan_version
        )));
    }

    let state = &mut dev.mac_state;
    let reqs: Vec<LinkAdrReq> = take_request_block(&mut state.pending_requests)?;
    if dup_count as usize + 1 > reqs.len() {
        return Err(MacError::InvalidPayload(format!(
            "{} LinkADRAns for {} LinkADRReq",
            dup_count + 1,
            reqs.len()
        )));
    }
    let Some(last) = reqs.last() else {
        return Err(MacError::RequestNotFound { cid: Cid::LinkAdr });
    };

    let accepted = pld.channel_mask_ack && pld.data_rate_index_ack && pld.tx_power_index_ack;
    let event = MacEvent::answer(accepted, UplinkCommand::LinkAdrAns(pld.clone()));
    if !accepted {
        warn!(
            "{} rejected LinkADRReq (mask: {}, DR{}: {}, power {}: {})",
            dev.device_id,
            pld.channel_mask_ack,
            last.data_rate_index,
            pld.data_rate_index_ack,
            last.tx_power_index,
            pld.tx_power_index_ack
        );
        // No-change sentinels are recorded too, so they are not offered again
        if !pld.data_rate_index_ack {
            state
                .rejected_adr_data_rate_indexes
                .insert(last.data_rate_index);
        }
        if !pld.tx_power_index_ack {
            state
                .rejected_adr_tx_power_indexes
                .insert(last.tx_power_index);
        }
        return Ok(vec![event]);
    }

    let current = &mut state.current_parameters;
    let mut bits: Vec<bool> = current.channels.iter().map(|ch| ch.enable_uplink).collect();
    for req in &reqs {
        let pair = ChMaskPair::new(req.channel_mask_control, req.channel_mask);
        bits = phy.parse_ch_mask(&pair, &bits)?;
    }
    for (index, (ch, on)) in current.channels.iter().zip(&bits).enumerate() {
        if *on && ch.uplink_frequency == 0 {
            return Err(Corruption::EnabledWithoutFrequency { index }.into());
        }
    }
    for (ch, on) in current.channels.iter_mut().zip(bits) {
        ch.enable_uplink = on;
    }

    if Some(last.data_rate_index) != caps.no_change_data_rate_index {
        current.data_rate_index = last.data_rate_index;
    }
    if Some(last.tx_power_index) != caps.no_change_tx_power_index {
        current.tx_power_index = last.tx_power_index;
    }
    if last.nb_trans != 0 {
        current.nb_trans = last.nb_trans;
    }
    state.last_adr_change_f_cnt_up = f_cnt_up;
    debug!(
        "{} accepted LinkADRReq: DR{} power {} NbTrans {}",
        dev.device_id, current.data_rate_index, current.tx_power_index, current.nb_trans
    );
    Ok(vec![event])
}
