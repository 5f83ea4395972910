//! RelayEndDeviceConfReq / RelayEndDeviceConfAns
//!
//! Puts an end device in (or out of) relay mode.

use tracing::warn;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{
    RelayEndDeviceConfAns, RelayEndDeviceConfReq, Request, ServedRelayConfig,
};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::{EndDevice, MacParameters, RelayParameters};
use crate::mac::{take_request, MacContext};

fn served_config(params: &MacParameters) -> Option<&ServedRelayConfig> {
    params.relay.as_ref().and_then(RelayParameters::served_config)
}

fn serving_device_id(params: &MacParameters) -> Option<&str> {
    match &params.relay {
        Some(RelayParameters::Served {
            serving_device_id, ..
        }) => Some(serving_device_id),
        _ => None,
    }
}

pub fn device_needs_relay_end_device_conf_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    !dev.multicast
        && !state.has_pending(Cid::RelayEndDeviceConf)
        && served_config(&state.desired_parameters) != served_config(&state.current_parameters)
}

pub fn enqueue_relay_end_device_conf_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_relay_end_device_conf_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let req = RelayEndDeviceConfReq {
        configuration: served_config(&dev.mac_state.desired_parameters).cloned(),
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_relay_end_device_conf_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RelayEndDeviceConfAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: RelayEndDeviceConfReq = take_request(&mut dev.mac_state.pending_requests)?;
    let accepted = pld.all_acked();
    if !accepted {
        warn!("{} rejected RelayEndDeviceConfReq: {:?}", dev.device_id, pld);
    } else {
        let state = &mut dev.mac_state;
        let relay_id = serving_device_id(&state.desired_parameters)
            .or_else(|| serving_device_id(&state.current_parameters))
            .unwrap_or_default()
            .to_string();
        let current = &mut state.current_parameters;
        current.relay = match (req.configuration, current.relay.take()) {
            (Some(config), _) => Some(RelayParameters::Served {
                config,
                serving_device_id: relay_id,
            }),
            (None, Some(serving @ RelayParameters::Serving { .. })) => Some(serving),
            (None, _) => None,
        };
    }
    Ok(vec![MacEvent::answer(
        accepted,
        UplinkCommand::RelayEndDeviceConfAns(pld.clone()),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::commands::ServedRelayMode;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    fn served(backoff: u8) -> RelayParameters {
        RelayParameters::Served {
            config: ServedRelayConfig {
                mode: ServedRelayMode::Dynamic {
                    smart_enable_level: 1,
                },
                backoff,
                second_channel: None,
            },
            serving_device_id: "relay-1".to_string(),
        }
    }

    fn ans(backoff_ack: bool) -> RelayEndDeviceConfAns {
        RelayEndDeviceConfAns {
            second_channel_frequency_ack: true,
            second_channel_data_rate_index_ack: true,
            second_channel_index_ack: true,
            backoff_ack,
        }
    }

    #[test]
    fn test_enable_relay_mode() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.desired_parameters.relay = Some(served(4));
        assert!(device_needs_relay_end_device_conf_req(&dev));

        enqueue_relay_end_device_conf_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert!(!device_needs_relay_end_device_conf_req(&dev));
        let evs =
            handle_relay_end_device_conf_ans(&env.ctx(), &mut dev, Some(&ans(true))).unwrap();
        assert!(matches!(evs[0], MacEvent::ReceiveAccept { .. }));
        assert_eq!(dev.mac_state.current_parameters.relay, Some(served(4)));
    }

    #[test]
    fn test_rejected_backoff_keeps_current() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.current_parameters.relay = Some(served(4));
        dev.mac_state.desired_parameters.relay = Some(served(8));

        enqueue_relay_end_device_conf_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        handle_relay_end_device_conf_ans(&env.ctx(), &mut dev, Some(&ans(false))).unwrap();
        assert_eq!(dev.mac_state.current_parameters.relay, Some(served(4)));
        assert!(device_needs_relay_end_device_conf_req(&dev));
    }
}
