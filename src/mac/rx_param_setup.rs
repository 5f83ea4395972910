//! RXParamSetupReq / RXParamSetupAns
//!
//! From LoRaWAN 1.0.2 the answer is sticky: the device repeats it until it
//! receives a downlink, so answers without a pending request are ignored.

use tracing::{debug, warn};

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{Request, RxParamSetupAns, RxParamSetupReq};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, take_request_opt, MacContext};

pub fn device_needs_rx_param_setup_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    let (current, desired) = (&state.current_parameters, &state.desired_parameters);
    !dev.multicast
        && !state.has_pending(Cid::RxParamSetup)
        && (desired.rx1_data_rate_offset != current.rx1_data_rate_offset
            || desired.rx2_data_rate_index != current.rx2_data_rate_index
            || desired.rx2_frequency != current.rx2_frequency)
}

pub fn enqueue_rx_param_setup_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_rx_param_setup_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let desired = &dev.mac_state.desired_parameters;
    let req = RxParamSetupReq {
        rx1_data_rate_offset: desired.rx1_data_rate_offset,
        rx2_data_rate_index: desired.rx2_data_rate_index,
        rx2_frequency: desired.rx2_frequency,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_rx_param_setup_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RxParamSetupAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let pending = &mut dev.mac_state.pending_requests;
    let req: RxParamSetupReq = if dev.mac_state.lorawan_version.capabilities().sticky_answers {
        match take_request_opt(pending)? {
            Some(req) => req,
            None => {
                debug!("Repeated RXParamSetupAns from {}", dev.device_id);
                return Ok(Vec::new());
            }
        }
    } else {
        take_request(pending)?
    };

    let accepted = pld.rx1_data_rate_offset_ack && pld.rx2_data_rate_index_ack && pld.rx2_frequency_ack;
    if accepted {
        let current = &mut dev.mac_state.current_parameters;
        current.rx1_data_rate_offset = req.rx1_data_rate_offset;
        current.rx2_data_rate_index = req.rx2_data_rate_index;
        current.rx2_frequency = req.rx2_frequency;
    } else {
        warn!("{} rejected RXParamSetupReq: {:?}", dev.device_id, pld);
    }
    Ok(vec![MacEvent::answer(
        accepted,
        UplinkCommand::RxParamSetupAns(pld.clone()),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    fn ack(all: bool) -> RxParamSetupAns {
        RxParamSetupAns {
            rx1_data_rate_offset_ack: true,
            rx2_data_rate_index_ack: all,
            rx2_frequency_ack: true,
        }
    }

    #[test]
    fn test_accept_updates_current() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.desired_parameters.rx2_data_rate_index = 3;
        dev.mac_state.desired_parameters.rx2_frequency = 869_525_000;
        enqueue_rx_param_setup_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert!(!device_needs_rx_param_setup_req(&dev));

        let evs = handle_rx_param_setup_ans(&env.ctx(), &mut dev, Some(&ack(true))).unwrap();
        assert!(matches!(evs[0], MacEvent::ReceiveAccept { .. }));
        assert_eq!(dev.mac_state.current_parameters.rx2_data_rate_index, 3);
        assert!(!device_needs_rx_param_setup_req(&dev));

        // Sticky repetition
        let evs = handle_rx_param_setup_ans(&env.ctx(), &mut dev, Some(&ack(true))).unwrap();
        assert!(evs.is_empty());
    }

    #[test]
    fn test_reject_keeps_current() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_1, phy);
        dev.mac_state.desired_parameters.rx1_data_rate_offset = 2;
        enqueue_rx_param_setup_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        let evs = handle_rx_param_setup_ans(&env.ctx(), &mut dev, Some(&ack(false))).unwrap();
        assert!(matches!(evs[0], MacEvent::ReceiveReject { .. }));
        assert_eq!(dev.mac_state.current_parameters.rx1_data_rate_offset, 0);

        // Not sticky before 1.0.2
        assert!(matches!(
            handle_rx_param_setup_ans(&env.ctx(), &mut dev, Some(&ack(true))),
            Err(MacError::RequestNotFound { .. })
        ));
    }
}
