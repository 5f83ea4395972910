//! MAC command reconciliation
//!
//! Each request module follows the same three phases:
//!
//! - `device_needs_*`: compare current and desired parameters
//! - `enqueue_*`: build the request within the downlink budget and record it
//!   as pending
//! - `handle_*`: match an answer against the oldest pending request and apply
//!   it to the current parameters
//!
//! [`uplink::handle_uplink`] and [`downlink::enqueue_downlink`] drive the
//! modules for a whole frame.

pub mod adr;
pub mod adr_param_setup;
pub mod beacon_freq;
pub mod dev_status;
pub mod device_mode;
pub mod device_time;
pub mod dl_channel;
pub mod downlink;
pub mod duty_cycle;
pub mod enqueue;
pub mod events;
pub mod link_adr;
pub mod link_check;
pub mod new_channel;
pub mod ping_slot_channel;
pub mod ping_slot_info;
pub mod rejoin_param_setup;
pub mod rekey;
pub mod relay_conf;
pub mod relay_end_device_conf;
pub mod relay_update_uplink_list;
pub mod reset;
pub mod rx_param_setup;
pub mod rx_timing_setup;
pub mod settings;
pub mod state;
pub mod tx_param_setup;
pub mod uplink;

use chrono::{DateTime, Utc};

use crate::error::{Corruption, MacError, Result};
use crate::frequency_plan::FrequencyPlan;
use crate::lorawan::commands::Request;
use crate::lorawan::DownlinkCommand;

pub use enqueue::{Batch, EnqueueState};
pub use events::MacEvent;
pub use settings::{AdrMode, Defaults, MacSettings};
pub use state::{EndDevice, MacParameters, MacState};

/// Served device whose root WOR session key a relay needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayKeyRequest {
    pub device_id: String,
    pub session_key_id: String,
}

/// Derives relay session keys; backed by the join server in production
pub trait RelayKeyService: Send + Sync {
    /// One key per request, in request order
    fn batch_derive_root_wor_s_keys(
        &self,
        requests: &[RelayKeyRequest],
    ) -> anyhow::Result<Vec<[u8; 16]>>;
}

/// Everything a MAC handler needs besides the device and its band
#[derive(Clone, Copy)]
pub struct MacContext<'a> {
    pub now: DateTime<Utc>,
    pub defaults: &'a Defaults,
    pub frequency_plan: &'a FrequencyPlan,
    pub relay_keys: &'a dyn RelayKeyService,
}

impl<'a> MacContext<'a> {
    pub fn new(
        now: DateTime<Utc>,
        defaults: &'a Defaults,
        frequency_plan: &'a FrequencyPlan,
        relay_keys: &'a dyn RelayKeyService,
    ) -> Self {
        Self {
            now,
            defaults,
            frequency_plan,
            relay_keys,
        }
    }
}

/// Queue an answer or confirmation for the next downlink
pub(crate) fn queue_response(state: &mut MacState, command: DownlinkCommand) -> MacEvent {
    state.queued_responses.push(command.clone());
    MacEvent::EnqueueResponse { command }
}

fn position_of<R: Request>(pending: &[DownlinkCommand]) -> Option<usize> {
    pending.iter().position(|cmd| cmd.cid() == R::CID)
}

fn cast<R: Request>(cmd: &DownlinkCommand) -> Result<R> {
    R::from_command(cmd)
        .cloned()
        .ok_or_else(|| Corruption::RequestMismatch { cid: R::CID }.into())
}

/// Remove the oldest pending request of type `R`
pub(crate) fn take_request<R: Request>(pending: &mut Vec<DownlinkCommand>) -> Result<R> {
    take_request_opt(pending)?.ok_or(MacError::RequestNotFound { cid: R::CID })
}

/// Like [`take_request`], for answers a device may repeat after the request
/// was already handled
pub(crate) fn take_request_opt<R: Request>(
    pending: &mut Vec<DownlinkCommand>,
) -> Result<Option<R>> {
    match position_of::<R>(pending) {
        Some(index) => cast(&pending.remove(index)).map(Some),
        None => Ok(None),
    }
}

/// Remove the oldest contiguous run of pending requests of type `R`
pub(crate) fn take_request_block<R: Request>(pending: &mut Vec<DownlinkCommand>) -> Result<Vec<R>> {
    let start = position_of::<R>(pending).ok_or(MacError::RequestNotFound { cid: R::CID })?;
    let len = pending[start..]
        .iter()
        .take_while(|cmd| cmd.cid() == R::CID)
        .count();
    pending
        .drain(start..start + len)
        .map(|cmd| cast(&cmd))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_util {
    use chrono::TimeZone;

    use super::*;
    use crate::band::Band;
    use crate::lorawan::MacVersion;

    /// Returns a key derived from the request position
    pub struct StaticKeys;

    impl RelayKeyService for StaticKeys {
        fn batch_derive_root_wor_s_keys(
            &self,
            requests: &[RelayKeyRequest],
        ) -> anyhow::Result<Vec<[u8; 16]>> {
            Ok((0..requests.len()).map(|i| [i as u8 + 1; 16]).collect())
        }
    }

    pub struct TestEnv {
        pub defaults: Defaults,
        pub plan: FrequencyPlan,
        pub keys: StaticKeys,
        pub now: DateTime<Utc>,
    }

    impl TestEnv {
        pub fn new(band_id: &str) -> Self {
            Self {
                defaults: Defaults::default(),
                plan: FrequencyPlan::new(band_id),
                keys: StaticKeys,
                now: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            }
        }

        pub fn ctx(&self) -> MacContext<'_> {
            MacContext::new(self.now, &self.defaults, &self.plan, &self.keys)
        }

        /// A joined device whose current parameters equal the desired ones
        pub fn device(&self, version: MacVersion, phy: &Band) -> EndDevice {
            let mut dev = EndDevice {
                device_id: "test-device".to_string(),
                lorawan_version: version,
                supports_join: true,
                ..Default::default()
            };
            dev.mac_state = settings::new_state(&dev, phy, &self.plan, &self.defaults)
                .expect("test MAC state");
            dev.mac_state.desired_parameters = dev.mac_state.current_parameters.clone();
            dev
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::commands::{DevStatusReq, DutyCycleReq, LinkAdrReq};

    fn link_adr(mask: u16) -> DownlinkCommand {
        DownlinkCommand::LinkAdrReq(LinkAdrReq {
            data_rate_index: 5,
            tx_power_index: 0,
            channel_mask: mask,
            channel_mask_control: 0,
            nb_trans: 1,
        })
    }

    #[test]
    fn test_take_request_is_fifo() {
        let mut pending = vec![
            DownlinkCommand::DevStatusReq(DevStatusReq),
            DownlinkCommand::DutyCycleReq(DutyCycleReq { max_duty_cycle: 1 }),
            DownlinkCommand::DutyCycleReq(DutyCycleReq { max_duty_cycle: 2 }),
        ];
        let req: DutyCycleReq = take_request(&mut pending).unwrap();
        assert_eq!(req.max_duty_cycle, 1);
        assert_eq!(pending.len(), 2);
        assert!(matches!(
            take_request::<LinkAdrReq>(&mut pending),
            Err(MacError::RequestNotFound { .. })
        ));
        assert_eq!(take_request_opt::<LinkAdrReq>(&mut pending).unwrap(), None);
    }

    #[test]
    fn test_take_request_block_stops_at_other_cid() {
        let mut pending = vec![
            DownlinkCommand::DevStatusReq(DevStatusReq),
            link_adr(1),
            link_adr(2),
            DownlinkCommand::DevStatusReq(DevStatusReq),
            link_adr(3),
        ];
        let block: Vec<LinkAdrReq> = take_request_block(&mut pending).unwrap();
        assert_eq!(
            block.iter().map(|r| r.channel_mask).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[2], link_adr(3));
    }
}
