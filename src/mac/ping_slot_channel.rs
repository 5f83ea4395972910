//! PingSlotChannelReq / PingSlotChannelAns (Class B)

use tracing::warn;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{PingSlotChannelAns, PingSlotChannelReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{take_request, MacContext};

/// Class B commands go to devices that announced a ping slot periodicity
pub(crate) fn class_b_capable(dev: &EndDevice) -> bool {
    !dev.multicast
        && dev.mac_state.lorawan_version.capabilities().class_b
        && dev.mac_state.ping_slot_periodicity.is_some()
}

pub fn device_needs_ping_slot_channel_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    let (current, desired) = (&state.current_parameters, &state.desired_parameters);
    class_b_capable(dev)
        && !state.has_pending(Cid::PingSlotChannel)
        && (desired.ping_slot_frequency != current.ping_slot_frequency
            || desired.ping_slot_data_rate_index != current.ping_slot_data_rate_index)
}

pub fn enqueue_ping_slot_channel_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_ping_slot_channel_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let desired = &dev.mac_state.desired_parameters;
    let req = PingSlotChannelReq {
        frequency: desired.ping_slot_frequency,
        data_rate_index: desired.ping_slot_data_rate_index,
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_ping_slot_channel_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&PingSlotChannelAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: PingSlotChannelReq = take_request(&mut dev.mac_state.pending_requests)?;
    let accepted = pld.frequency_ack && pld.data_rate_index_ack;
    if accepted {
        let current = &mut dev.mac_state.current_parameters;
        current.ping_slot_frequency = req.frequency;
        current.ping_slot_data_rate_index = req.data_rate_index;
    } else {
        warn!("{} rejected PingSlotChannelReq: {:?}", dev.device_id, pld);
    }
    Ok(vec![MacEvent::answer(
        accepted,
        UplinkCommand::PingSlotChannelAns(pld.clone()),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    #[test]
    fn test_requires_class_b_device() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.desired_parameters.ping_slot_frequency = 869_525_000;
        assert!(!device_needs_ping_slot_channel_req(&dev));

        dev.mac_state.ping_slot_periodicity = Some(3);
        assert!(device_needs_ping_slot_channel_req(&dev));
        enqueue_ping_slot_channel_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        let ans = PingSlotChannelAns {
            frequency_ack: true,
            data_rate_index_ack: true,
        };
        handle_ping_slot_channel_ans(&env.ctx(), &mut dev, Some(&ans)).unwrap();
        assert_eq!(
            dev.mac_state.current_parameters.ping_slot_frequency,
            869_525_000
        );
    }
}
