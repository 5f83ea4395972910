//! RejoinParamSetupReq / RejoinParamSetupAns (LoRaWAN 1.1)
//!
//! The device always applies the count limit; the time limit only when it
//! acknowledges it.

use tracing::warn;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{RejoinParamSetupAns, RejoinParamSetupReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, MacContext};

pub fn device_needs_rejoin_param_setup_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    let (current, desired) = (&state.current_parameters, &state.desired_parameters);
    !dev.multicast
        && state.lorawan_version.capabilities().rejoin_param_setup
        && !state.has_pending(Cid::RejoinParamSetup)
        && (desired.rejoin_count_exponent != current.rejoin_count_exponent
            || desired.rejoin_time_exponent != current.rejoin_time_exponent)
}

pub fn enqueue_rejoin_param_setup_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_rejoin_param_setup_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let desired = &dev.mac_state.desired_parameters;
    let req = RejoinParamSetupReq {
        max_count_exponent: desired.rejoin_count_exponent,
        max_time_exponent: desired.rejoin_time_exponent,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_rejoin_param_setup_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RejoinParamSetupAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: RejoinParamSetupReq = take_request(&mut dev.mac_state.pending_requests)?;
    let current = &mut dev.mac_state.current_parameters;
    current.rejoin_count_exponent = req.max_count_exponent;
    if pld.max_time_exponent_ack {
        current.rejoin_time_exponent = req.max_time_exponent;
    } else {
        warn!(
            "{} rejected rejoin time exponent {}",
            dev.device_id, req.max_time_exponent
        );
    }
    Ok(vec![MacEvent::answer(
        pld.max_time_exponent_ack,
        UplinkCommand::RejoinParamSetupAns(pld.clone()),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    #[test]
    fn test_time_nack_applies_count_only() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_1, phy);
        dev.mac_state.desired_parameters.rejoin_count_exponent = 4;
        dev.mac_state.desired_parameters.rejoin_time_exponent = 9;
        enqueue_rejoin_param_setup_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();

        let ans = RejoinParamSetupAns {
            max_time_exponent_ack: false,
        };
        let evs = handle_rejoin_param_setup_ans(&env.ctx(), &mut dev, Some(&ans)).unwrap();
        assert!(matches!(evs[0], MacEvent::ReceiveReject { .. }));
        let current = &dev.mac_state.current_parameters;
        assert_eq!((current.rejoin_count_exponent, current.rejoin_time_exponent), (4, 0));
    }
}
