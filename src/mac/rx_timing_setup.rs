//! RXTimingSetupReq / RXTimingSetupAns

use tracing::debug;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{Request, RxTimingSetupAns, RxTimingSetupReq};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, take_request_opt, MacContext};

pub fn device_needs_rx_timing_setup_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    !dev.multicast
        && !state.has_pending(Cid::RxTimingSetup)
        && state.desired_parameters.rx1_delay != state.current_parameters.rx1_delay
}

pub fn enqueue_rx_timing_setup_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_rx_timing_setup_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let req = RxTimingSetupReq {
        delay: dev.mac_state.desired_parameters.rx1_delay,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_rx_timing_setup_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RxTimingSetupAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let pending = &mut dev.mac_state.pending_requests;
    let req: RxTimingSetupReq = if dev.mac_state.lorawan_version.capabilities().sticky_answers {
        match take_request_opt(pending)? {
            Some(req) => req,
            None => {
                debug!("Repeated RXTimingSetupAns from {}", dev.device_id);
                return Ok(Vec::new());
            }
        }
    } else {
        take_request(pending)?
    };
    dev.mac_state.current_parameters.rx1_delay = req.delay;
    Ok(vec![MacEvent::ReceiveAccept {
        command: UplinkCommand::RxTimingSetupAns(pld.clone()),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    #[test]
    fn test_rx1_delay_update() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_4, phy);
        dev.mac_state.desired_parameters.rx1_delay = 5;
        assert!(device_needs_rx_timing_setup_req(&dev));

        // No room for the answer
        let st = enqueue_rx_timing_setup_req(&env.ctx(), &mut dev, 51, 0, phy).unwrap();
        assert!(!st.ok);
        assert!(dev.mac_state.pending_requests.is_empty());

        enqueue_rx_timing_setup_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        handle_rx_timing_setup_ans(&env.ctx(), &mut dev, Some(&RxTimingSetupAns)).unwrap();
        assert_eq!(dev.mac_state.current_parameters.rx1_delay, 5);
        assert!(handle_rx_timing_setup_ans(&env.ctx(), &mut dev, Some(&RxTimingSetupAns))
            .unwrap()
            .is_empty());
    }
}
