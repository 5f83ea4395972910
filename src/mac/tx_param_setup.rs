//! TXParamSetupReq / TXParamSetupAns
//!
//! Only bands that allow it (AS923, AU915) negotiate dwell time and max EIRP.

use crate::band::{Band, MAX_EIRP_TABLE};
use crate::error::{MacError, Result};
use crate::lorawan::commands::{Request, TxParamSetupAns, TxParamSetupReq};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, MacContext};

/// Largest MaxEIRP index not above `eirp`
pub fn max_eirp_index(eirp: f32) -> u8 {
    MAX_EIRP_TABLE
        .iter()
        .rposition(|&v| v <= eirp)
        .unwrap_or(0) as u8
}

fn desired_req(dev: &EndDevice) -> Option<TxParamSetupReq> {
    let desired = &dev.mac_state.desired_parameters;
    Some(TxParamSetupReq {
        max_eirp_index: max_eirp_index(desired.max_eirp),
        uplink_dwell_time: desired.uplink_dwell_time?,
        downlink_dwell_time: desired.downlink_dwell_time?,
    })
}

pub fn device_needs_tx_param_setup_req(dev: &EndDevice, phy: &Band) -> bool {
    let state = &dev.mac_state;
    if dev.multicast
        || !phy.tx_param_setup_req_support
        || !state.lorawan_version.capabilities().tx_param_setup
        || state.has_pending(Cid::TxParamSetup)
    {
        return false;
    }
    let Some(req) = desired_req(dev) else {
        return false;
    };
    let current = &state.current_parameters;
    MAX_EIRP_TABLE[req.max_eirp_index as usize] != current.max_eirp
        || Some(req.uplink_dwell_time) != current.uplink_dwell_time
        || Some(req.downlink_dwell_time) != current.downlink_dwell_time
}

pub fn enqueue_tx_param_setup_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_tx_param_setup_req(dev, phy) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let Some(req) = desired_req(dev) else {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_tx_param_setup_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&TxParamSetupAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: TxParamSetupReq = take_request(&mut dev.mac_state.pending_requests)?;
    let current = &mut dev.mac_state.current_parameters;
    current.max_eirp = MAX_EIRP_TABLE[(req.max_eirp_index & 0x0F) as usize];
    current.uplink_dwell_time = Some(req.uplink_dwell_time);
    current.downlink_dwell_time = Some(req.downlink_dwell_time);
    Ok(vec![MacEvent::ReceiveAccept {
        command: UplinkCommand::TxParamSetupAns(pld.clone()),
    }])
}
