//! BeaconFreqReq / BeaconFreqAns (Class B)

use tracing::warn;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{BeaconFreqAns, BeaconFreqReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::ping_slot_channel::class_b_capable;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, MacContext};

pub fn device_needs_beacon_freq_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    class_b_capable(dev)
        && !state.has_pending(Cid::BeaconFreq)
        && state.desired_parameters.beacon_frequency != state.current_parameters.beacon_frequency
}

pub fn enqueue_beacon_freq_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_beacon_freq_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let req = BeaconFreqReq {
        frequency: dev.mac_state.desired_parameters.beacon_frequency,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_beacon_freq_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&BeaconFreqAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: BeaconFreqReq = take_request(&mut dev.mac_state.pending_requests)?;
    if pld.frequency_ack {
        dev.mac_state.current_parameters.beacon_frequency = req.frequency;
    } else {
        warn!(
            "{} rejected beacon frequency {} Hz",
            dev.device_id, req.frequency
        );
    }
    Ok(vec![MacEvent::answer(
        pld.frequency_ack,
        UplinkCommand::BeaconFreqAns(pld.clone()),
    )])
}
