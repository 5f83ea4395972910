//! DevStatusReq / DevStatusAns
//!
//! Status is requested every `status_count_periodicity` uplinks or every
//! `status_time_periodicity` seconds, whichever comes first. Zero disables a
//! trigger.

use chrono::Duration;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{DevStatusAns, DevStatusReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::settings::SettingsChain;
use crate::mac::state::{EndDevice, PowerState};
use crate::mac::{take_request, MacContext};

pub fn device_needs_dev_status_req(ctx: &MacContext, dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    if dev.multicast || state.has_pending(Cid::DevStatus) {
        return false;
    }
    let chain = SettingsChain::new(&dev.mac_settings, ctx.defaults);
    let count = chain.status_count_periodicity();
    let seconds = chain.status_time_periodicity();
    if count > 0
        && dev
            .session
            .last_f_cnt_up
            .saturating_sub(state.last_dev_status_f_cnt_up)
            >= count
    {
        return true;
    }
    if seconds == 0 {
        return false;
    }
    match state.last_dev_status_at {
        None => true,
        Some(at) => ctx.now - at >= Duration::seconds(seconds as i64),
    }
}

pub fn enqueue_dev_status_req(
    ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_dev_status_req(ctx, dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        DevStatusReq.into_command(),
    )
}

fn power_state(battery: u8) -> PowerState {
    match battery {
        0 => PowerState::External,
        255 => PowerState::Unknown,
        level => PowerState::Battery {
            percentage: (level - 1) as f32 / 253.0 * 100.0,
        },
    }
}

pub fn handle_dev_status_ans(
    ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&DevStatusAns>,
    f_cnt_up: u32,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let _: DevStatusReq = take_request(&mut dev.mac_state.pending_requests)?;
    dev.power_state = power_state(pld.battery);
    dev.downlink_margin = Some(pld.margin);
    dev.mac_state.last_dev_status_f_cnt_up = f_cnt_up;
    dev.mac_state.last_dev_status_at = Some(ctx.now);
    Ok(vec![MacEvent::ReceiveAccept {
        command: UplinkCommand::DevStatusAns(pld.clone()),
    }])
}
