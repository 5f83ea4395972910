//! DutyCycleReq / DutyCycleAns

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{DutyCycleAns, DutyCycleReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, MacContext};

pub fn device_needs_duty_cycle_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    !dev.multicast
        && !state.has_pending(Cid::DutyCycle)
        && state.desired_parameters.max_duty_cycle != state.current_parameters.max_duty_cycle
}

pub fn enqueue_duty_cycle_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_duty_cycle_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let req = DutyCycleReq {
        max_duty_cycle: dev.mac_state.desired_parameters.max_duty_cycle,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_duty_cycle_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&DutyCycleAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: DutyCycleReq = take_request(&mut dev.mac_state.pending_requests)?;
    dev.mac_state.current_parameters.max_duty_cycle = req.max_duty_cycle;
    Ok(vec![MacEvent::ReceiveAccept {
        command: UplinkCommand::DutyCycleAns(pld.clone()),
    }])
}
