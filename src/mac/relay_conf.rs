//! RelayConfReq / RelayConfAns
//!
//! Configures a device as a serving relay, or stops it.

use tracing::warn;

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{RelayConfAns, RelayConfReq, Request, ServingRelayConfig};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_single, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::{EndDevice, MacParameters, RelayParameters};
use crate::mac::{take_request, MacContext};

fn serving_config(params: &MacParameters) -> Option<&ServingRelayConfig> {
    params.relay.as_ref().and_then(RelayParameters::serving_config)
}

pub fn device_needs_relay_conf_req(dev: &EndDevice) -> bool {
    let state = &dev.mac_state;
    !dev.multicast
        && !state.has_pending(Cid::RelayConf)
        && serving_config(&state.desired_parameters) != serving_config(&state.current_parameters)
}

pub fn enqueue_relay_conf_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_relay_conf_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let req = RelayConfReq {
        configuration: serving_config(&dev.mac_state.desired_parameters).cloned(),
    };
    enqueue_single(
        max_down_len,
        max_up_len,
        &mut dev.mac_state.pending_requests,
        req.into_command(),
    )
}

pub fn handle_relay_conf_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RelayConfAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: RelayConfReq = take_request(&mut dev.mac_state.pending_requests)?;
    let accepted = pld.all_acked();
    if !accepted {
        warn!("{} rejected RelayConfReq: {:?}", dev.device_id, pld);
    } else {
        let current = &mut dev.mac_state.current_parameters;
        current.relay = match (req.configuration, current.relay.take()) {
            (
                Some(config),
                Some(RelayParameters::Serving {
                    uplink_forwarding_rules,
                    ..
                }),
            ) => Some(RelayParameters::Serving {
                config,
                uplink_forwarding_rules,
            }),
            (Some(config), _) => Some(RelayParameters::Serving {
                config,
                uplink_forwarding_rules: Vec::new(),
            }),
            // Stopping the relay leaves a served role untouched
            (None, Some(served @ RelayParameters::Served { .. })) => Some(served),
            (None, _) => None,
        };
    }
    Ok(vec![MacEvent::answer(
        accepted,
        UplinkCommand::RelayConfAns(pld.clone()),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::state::RelayForwardingRule;
    use crate::mac::test_util::TestEnv;

    fn serving(cad_periodicity: u8) -> RelayParameters {
        RelayParameters::Serving {
            config: ServingRelayConfig {
                second_channel: None,
                default_channel_index: 0,
                cad_periodicity,
            },
            uplink_forwarding_rules: Vec::new(),
        }
    }

    fn ans(all: bool) -> RelayConfAns {
        RelayConfAns {
            second_channel_frequency_ack: true,
            second_channel_ack_offset_ack: true,
            second_channel_data_rate_index_ack: true,
            second_channel_index_ack: true,
            default_channel_index_ack: true,
            cad_periodicity_ack: all,
        }
    }

    #[test]
    fn test_start_relay() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_4, phy);
        dev.mac_state.desired_parameters.relay = Some(serving(2));
        assert!(device_needs_relay_conf_req(&dev));

        enqueue_relay_conf_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        let evs = handle_relay_conf_ans(&env.ctx(), &mut dev, Some(&ans(false))).unwrap();
        assert!(matches!(evs[0], MacEvent::ReceiveReject { .. }));
        assert_eq!(dev.mac_state.current_parameters.relay, None);

        enqueue_relay_conf_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        handle_relay_conf_ans(&env.ctx(), &mut dev, Some(&ans(true))).unwrap();
        assert_eq!(dev.mac_state.current_parameters.relay, Some(serving(2)));
        assert!(!device_needs_relay_conf_req(&dev));
    }

    #[test]
    fn test_reconfigure_keeps_forwarding_rules() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_4, phy);
        let rule = RelayForwardingRule {
            device_id: "served-1".to_string(),
            ..Default::default()
        };
        let mut current = serving(1);
        if let RelayParameters::Serving {
            uplink_forwarding_rules,
            ..
        } = &mut current
        {
            uplink_forwarding_rules.push(rule.clone());
        }
        dev.mac_state.current_parameters.relay = Some(current);
        dev.mac_state.desired_parameters.relay = Some(serving(3));

        enqueue_relay_conf_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        handle_relay_conf_ans(&env.ctx(), &mut dev, Some(&ans(true))).unwrap();
        let relay = dev.mac_state.current_parameters.relay.as_ref().unwrap();
        assert_eq!(relay.serving_config().unwrap().cad_periodicity, 3);
        assert_eq!(relay.forwarding_rules(), &[rule]);
    }

    #[test]
    fn test_stop_relay() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_4, phy);
        dev.mac_state.current_parameters.relay = Some(serving(1));
        enqueue_relay_conf_req(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert_eq!(
            dev.mac_state.pending_requests,
            vec![RelayConfReq {
                configuration: None
            }
            .into_command()]
        );
        handle_relay_conf_ans(&env.ctx(), &mut dev, Some(&ans(true))).unwrap();
        assert_eq!(dev.mac_state.current_parameters.relay, None);
    }
}
