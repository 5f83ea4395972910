//! ADRParamSetupReq / ADRParamSetupAns (LoRaWAN 1.1)

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{AdrParamSetupAns, AdrParamSetupReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, MacContext};

pub fn device_needs_adr_param_setup_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    let (current, desired) = (&state.current_parameters, &state.desired_parameters);
    !dev.multicast
        && state.lorawan_version.capabilities().adr_param_setup
        && !state.has_pending(Cid::AdrParamSetup)
        && (desired.adr_ack_limit_exponent != current.adr_ack_limit_exponent
            || desired.adr_ack_delay_exponent != current.adr_ack_delay_exponent)
}

pub fn enqueue_adr_param_setup_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_adr_param_setup_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let desired = &dev.mac_state.desired_parameters;
    let req = AdrParamSetupReq {
        adr_ack_limit_exponent: desired.adr_ack_limit_exponent,
        adr_ack_delay_exponent: desired.adr_ack_delay_exponent,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_adr_param_setup_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&AdrParamSetupAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: AdrParamSetupReq = take_request(&mut dev.mac_state.pending_requests)?;
    let current = &mut dev.mac_state.current_parameters;
    current.adr_ack_limit_exponent = req.adr_ack_limit_exponent;
    current.adr_ack_delay_exponent = req.adr_ack_delay_exponent;
    Ok(vec![MacEvent::ReceiveAccept {
        command: UplinkCommand::AdrParamSetupAns(pld.clone()),
    }])
}
