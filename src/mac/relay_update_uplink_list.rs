//! RelayUpdateUplinkListReq / RelayUpdateUplinkListAns
//!
//! Installs uplink forwarding rules on a serving relay. Each rule carries the
//! root WOR session key of the served device, derived in one batch through the
//! [`RelayKeyService`](crate::mac::RelayKeyService).

use anyhow::anyhow;
use tracing::debug;

use crate::band::Band;
use crate::error::{Corruption, MacError, Result};
use crate::lorawan::commands::{RelayUpdateUplinkListAns, RelayUpdateUplinkListReq, Request};
use crate::lorawan::{Cid, UplinkCommand};
use crate::mac::enqueue::{enqueue_mac_command, Batch, EnqueueState};
use crate::mac::events::MacEvent;
use crate::mac::state::{EndDevice, RelayForwardingRule, RelayParameters};
use crate::mac::{take_request, MacContext, RelayKeyRequest};

/// Forwarding rules a relay can hold
pub const MAX_FORWARDING_RULES: usize = 16;

fn same_rule(current: Option<&RelayForwardingRule>, desired: &RelayForwardingRule) -> bool {
    current.map_or(false, |c| {
        c.device_id == desired.device_id
            && c.session_key_id == desired.session_key_id
            && c.dev_addr == desired.dev_addr
            && c.forward_limits == desired.forward_limits
    })
}

/// Indexes of desired rules the relay does not hold yet, in index order
fn outdated_rules(dev: &EndDevice) -> Vec<usize> {
    let state = &dev.mac_state;
    let (Some(current), Some(desired)) = (
        state.current_parameters.relay.as_ref(),
        state.desired_parameters.relay.as_ref(),
    ) else {
        return Vec::new();
    };
    let (RelayParameters::Serving { .. }, RelayParameters::Serving { .. }) = (current, desired)
    else {
        return Vec::new();
    };
    let current = current.forwarding_rules();
    desired
        .forwarding_rules()
        .iter()
        .take(MAX_FORWARDING_RULES)
        .enumerate()
        .filter(|(i, rule)| !same_rule(current.get(*i), rule))
        .map(|(i, _)| i)
        .collect()
}

pub fn device_needs_relay_update_uplink_list_req(dev: &EndDevice) -> bool {
    !dev.multicast
        && !dev.mac_state.has_pending(Cid::RelayUpdateUplinkList)
        && !outdated_rules(dev).is_empty()
}

pub fn enqueue_relay_update_uplink_list_req(
    ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    _phy: &Band,
) -> Result<EnqueueState> {
    if !device_needs_relay_update_uplink_list_req(dev) {
        return Ok(EnqueueState::unchanged(max_down_len, max_up_len));
    }
    let indexes = outdated_rules(dev);
    let state = &mut dev.mac_state;
    let desired = state
        .desired_parameters
        .relay
        .as_ref()
        .map(RelayParameters::forwarding_rules)
        .unwrap_or_default();
    let current = state
        .current_parameters
        .relay
        .as_ref()
        .map(RelayParameters::forwarding_rules)
        .unwrap_or_default();

    enqueue_mac_command(
        Cid::RelayUpdateUplinkList,
        max_down_len,
        max_up_len,
        &mut state.pending_requests,
        |n_down, n_up| {
            let n = indexes.len().min(n_down.min(n_up) as usize);
            if n == 0 {
                return Ok(Batch::deferred());
            }
            let selected = &indexes[..n];
            let key_requests: Vec<RelayKeyRequest> = selected
                .iter()
                .map(|&i| RelayKeyRequest {
                    device_id: desired[i].device_id.clone(),
                    session_key_id: desired[i].session_key_id.clone(),
                })
                .collect();
            let keys = ctx
                .relay_keys
                .batch_derive_root_wor_s_keys(&key_requests)
                .map_err(MacError::RelayKeys)?;
            if keys.len() != key_requests.len() {
                return Err(MacError::RelayKeys(anyhow!(
                    "requested {} keys, got {}",
                    key_requests.len(),
                    keys.len()
                )));
            }

            let mut batch = Batch {
                uplinks_needed: n as u16,
                ok: n == indexes.len(),
                ..Default::default()
            };
            for (&i, key) in selected.iter().zip(keys) {
                let rule = &desired[i];
                // A relay keeps the WOR frame counter of a device it already serves
                let w_f_cnt = current
                    .get(i)
                    .filter(|c| c.session_key_id == rule.session_key_id)
                    .map_or(0, |c| c.last_w_f_cnt);
                let command = RelayUpdateUplinkListReq {
                    rule_index: i as u8,
                    forward_limits: rule.forward_limits,
                    dev_addr: rule.dev_addr,
                    w_f_cnt,
                    root_wor_s_key: key,
                }
                .into_command();
                batch.events.push(MacEvent::EnqueueRequest {
                    command: command.clone(),
                });
                batch.commands.push(command);
            }
            Ok(batch)
        },
    )
}

pub fn handle_relay_update_uplink_list_ans(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RelayUpdateUplinkListAns>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let req: RelayUpdateUplinkListReq = take_request(&mut dev.mac_state.pending_requests)?;
    let index = req.rule_index as usize;
    let state = &mut dev.mac_state;

    let mut rule = state
        .desired_parameters
        .relay
        .as_ref()
        .and_then(|r| r.forwarding_rules().get(index))
        .filter(|r| r.dev_addr == req.dev_addr)
        .cloned()
        .unwrap_or_else(|| RelayForwardingRule {
            dev_addr: req.dev_addr,
            forward_limits: req.forward_limits,
            ..Default::default()
        });
    rule.last_w_f_cnt = req.w_f_cnt;

    let Some(RelayParameters::Serving {
        uplink_forwarding_rules,
        ..
    }) = state.current_parameters.relay.as_mut()
    else {
        return Err(Corruption::RequestMismatch {
            cid: Cid::RelayUpdateUplinkList,
        }
        .into());
    };
    if uplink_forwarding_rules.len() <= index {
        uplink_forwarding_rules.resize(index + 1, RelayForwardingRule::default());
    }
    debug!(
        "{} installed forwarding rule {} for {}",
        dev.device_id, index, rule.dev_addr
    );
    uplink_forwarding_rules[index] = rule;
    Ok(vec![MacEvent::ReceiveAccept {
        command: UplinkCommand::RelayUpdateUplinkListAns(pld.clone()),
    }])
}
