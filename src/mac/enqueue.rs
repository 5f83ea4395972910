//! Byte-budget aware command scheduler
//!
//! Every request module builds its commands through [`enqueue_mac_command`],
//! which translates the remaining downlink and uplink budgets into command
//! counts, lets the module build a batch, and appends the batch to the
//! pending request queue only if it fits.

use tracing::debug;

use crate::error::Result;
use crate::lorawan::{Cid, DownlinkCommand};
use crate::mac::events::MacEvent;

/// Outcome of one scheduling attempt
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueState {
    /// Remaining downlink budget in bytes
    pub max_down_len: u16,
    /// Remaining uplink budget in bytes
    pub max_up_len: u16,
    pub queued_events: Vec<MacEvent>,
    /// `false` if something was deferred for lack of space
    pub ok: bool,
}

impl EnqueueState {
    /// Nothing to do, budget untouched
    pub fn unchanged(max_down_len: u16, max_up_len: u16) -> Self {
        Self {
            max_down_len,
            max_up_len,
            queued_events: Vec::new(),
            ok: true,
        }
    }
}

/// Commands a module wants to send in this cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub commands: Vec<DownlinkCommand>,
    /// Answers the device will send for the batch
    pub uplinks_needed: u16,
    pub events: Vec<MacEvent>,
    /// `false` if the module could not fit everything it wanted
    pub ok: bool,
}

impl Batch {
    /// A batch that does not fit at all
    pub fn deferred() -> Self {
        Self {
            ok: false,
            ..Default::default()
        }
    }

    /// One request answered by one uplink command
    pub fn single(command: DownlinkCommand) -> Self {
        Self {
            events: vec![MacEvent::EnqueueRequest {
                command: command.clone(),
            }],
            commands: vec![command],
            uplinks_needed: 1,
            ok: true,
        }
    }
}

/// Build and enqueue commands of type `cid` within the given budgets
///
/// `build` receives how many downlink commands and uplink answers of this
/// type still fit. A batch exceeding either count is not enqueued and the
/// pending queue is left untouched.
pub fn enqueue_mac_command<F>(
    cid: Cid,
    max_down_len: u16,
    max_up_len: u16,
    pending: &mut Vec<DownlinkCommand>,
    build: F,
) -> Result<EnqueueState>
where
    F: FnOnce(u16, u16) -> Result<Batch>,
{
    let down_size = 1 + cid.downlink_len();
    let up_size = 1 + cid.uplink_len();
    let n_down = max_down_len / down_size;
    let n_up = max_up_len / up_size;

    let batch = build(n_down, n_up)?;
    let len = batch.commands.len() as u16;
    if len > n_down || batch.uplinks_needed > n_up {
        debug!(
            "{} batch of {} does not fit ({} down, {} up)",
            cid, len, n_down, n_up
        );
        return Ok(EnqueueState {
            max_down_len,
            max_up_len,
            queued_events: Vec::new(),
            ok: false,
        });
    }
    if len > 0 {
        debug!("Enqueued {} x {}", len, cid);
    }
    pending.extend(batch.commands);
    Ok(EnqueueState {
        max_down_len: max_down_len - len * down_size,
        max_up_len: max_up_len - batch.uplinks_needed * up_size,
        queued_events: batch.events,
        ok: batch.ok,
    })
}

/// Enqueue one request answered by one uplink command
pub fn enqueue_single(
    max_down_len: u16,
    max_up_len: u16,
    pending: &mut Vec<DownlinkCommand>,
    command: DownlinkCommand,
) -> Result<EnqueueState> {
    enqueue_mac_command(command.cid(), max_down_len, max_up_len, pending, |n_down, n_up| {
        if n_down == 0 || n_up == 0 {
            return Ok(Batch::deferred());
        }
        Ok(Batch::single(command))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::commands::{DevStatusReq, DutyCycleReq, NewChannelReq};

    #[test]
    fn test_budget_is_consumed() {
        let mut pending = Vec::new();
        let state = enqueue_mac_command(Cid::DutyCycle, 10, 5, &mut pending, |down, up| {
            assert_eq!((down, up), (5, 5));
            Ok(Batch::single(DownlinkCommand::DutyCycleReq(DutyCycleReq {
                max_duty_cycle: 3,
            })))
        })
        .unwrap();
        assert!(state.ok);
        assert_eq!((state.max_down_len, state.max_up_len), (8, 4));
        assert_eq!(pending.len(), 1);
        assert_eq!(state.queued_events.len(), 1);
    }

    #[test]
    fn test_no_room_leaves_pending_untouched() {
        let mut pending = vec![DownlinkCommand::DevStatusReq(DevStatusReq)];
        let state = enqueue_mac_command(Cid::NewChannel, 5, 10, &mut pending, |down, _| {
            assert_eq!(down, 0);
            Ok(Batch::deferred())
        })
        .unwrap();
        assert!(!state.ok);
        assert_eq!(state.max_down_len, 5);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_oversized_batch_is_refused() {
        let mut pending = Vec::new();
        let req = NewChannelReq {
            channel_index: 3,
            frequency: 867_100_000,
            min_data_rate_index: 0,
            max_data_rate_index: 5,
        };
        let state = enqueue_mac_command(Cid::NewChannel, 6, 10, &mut pending, |_, _| {
            Ok(Batch {
                commands: vec![
                    DownlinkCommand::NewChannelReq(req.clone()),
                    DownlinkCommand::NewChannelReq(req.clone()),
                ],
                uplinks_needed: 2,
                events: Vec::new(),
                ok: true,
            })
        })
        .unwrap();
        assert!(!state.ok);
        assert!(pending.is_empty());
        assert_eq!(state.max_down_len, 6);
    }
}
