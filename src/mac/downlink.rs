//! Downlink assembly
//!
//! [`enqueue_downlink`] fills the MAC part of the next downlink: queued
//! answers and confirmations first, then requests in
//! [`DOWNLINK_REQUEST_ORDER`] until the byte budget runs out.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::band::Band;
use crate::error::Result;
use crate::lorawan::codec::encode_downlink;
use crate::lorawan::{Cid, DownlinkCommand};
use crate::mac::enqueue::EnqueueState;
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{
    adr_param_setup, beacon_freq, dev_status, dl_channel, duty_cycle, link_adr, new_channel,
    ping_slot_channel, rejoin_param_setup, relay_conf, relay_end_device_conf,
    relay_update_uplink_list, rx_param_setup, rx_timing_setup, tx_param_setup, MacContext,
};

/// Request types the server initiates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    DutyCycle,
    RxParamSetup,
    DevStatus,
    NewChannel,
    DlChannel,
    RxTimingSetup,
    PingSlotChannel,
    BeaconFreq,
    TxParamSetup,
    LinkAdr,
    AdrParamSetup,
    RejoinParamSetup,
    RelayConf,
    RelayEndDeviceConf,
    RelayUpdateUplinkList,
}

/// Order in which requests compete for the downlink budget
///
/// NewChannelReq precedes LinkADRReq so that new channels are already
/// pending when the channel mask is computed.
pub const DOWNLINK_REQUEST_ORDER: [RequestKind; 15] = [
    RequestKind::DutyCycle,
    RequestKind::RxParamSetup,
    RequestKind::DevStatus,
    RequestKind::NewChannel,
    RequestKind::DlChannel,
    RequestKind::RxTimingSetup,
    RequestKind::PingSlotChannel,
    RequestKind::BeaconFreq,
    RequestKind::TxParamSetup,
    RequestKind::LinkAdr,
    RequestKind::AdrParamSetup,
    RequestKind::RejoinParamSetup,
    RequestKind::RelayConf,
    RequestKind::RelayEndDeviceConf,
    RequestKind::RelayUpdateUplinkList,
];

impl RequestKind {
    pub fn cid(self) -> Cid {
        match self {
            RequestKind::DutyCycle => Cid::DutyCycle,
            RequestKind::RxParamSetup => Cid::RxParamSetup,
            RequestKind::DevStatus => Cid::DevStatus,
            RequestKind::NewChannel => Cid::NewChannel,
            RequestKind::DlChannel => Cid::DlChannel,
            RequestKind::RxTimingSetup => Cid::RxTimingSetup,
            RequestKind::PingSlotChannel => Cid::PingSlotChannel,
            RequestKind::BeaconFreq => Cid::BeaconFreq,
            RequestKind::TxParamSetup => Cid::TxParamSetup,
            RequestKind::LinkAdr => Cid::LinkAdr,
            RequestKind::AdrParamSetup => Cid::AdrParamSetup,
            RequestKind::RejoinParamSetup => Cid::RejoinParamSetup,
            RequestKind::RelayConf => Cid::RelayConf,
            RequestKind::RelayEndDeviceConf => Cid::RelayEndDeviceConf,
            RequestKind::RelayUpdateUplinkList => Cid::RelayUpdateUplinkList,
        }
    }

    /// Whether the device's current parameters lag behind the desired ones
    pub fn device_needs(self, ctx: &MacContext, dev: &EndDevice, phy: &Band) -> bool {
        match self {
            RequestKind::DutyCycle => duty_cycle::device_needs_duty_cycle_req(dev),
            RequestKind::RxParamSetup => rx_param_setup::device_needs_rx_param_setup_req(dev),
            RequestKind::DevStatus => dev_status::device_needs_dev_status_req(ctx, dev),
            RequestKind::NewChannel => new_channel::device_needs_new_channel_req(dev, phy),
            RequestKind::DlChannel => dl_channel::device_needs_dl_channel_req(dev, phy),
            RequestKind::RxTimingSetup => rx_timing_setup::device_needs_rx_timing_setup_req(dev),
            RequestKind::PingSlotChannel => {
                ping_slot_channel::device_needs_ping_slot_channel_req(dev)
            }
            RequestKind::BeaconFreq => beacon_freq::device_needs_beacon_freq_req(dev),
            RequestKind::TxParamSetup => tx_param_setup::device_needs_tx_param_setup_req(dev, phy),
            RequestKind::LinkAdr => link_adr::device_needs_link_adr_req(dev, phy),
            RequestKind::AdrParamSetup => adr_param_setup::device_needs_adr_param_setup_req(dev),
            RequestKind::RejoinParamSetup => {
                rejoin_param_setup::device_needs_rejoin_param_setup_req(dev)
            }
            RequestKind::RelayConf => relay_conf::device_needs_relay_conf_req(dev),
            RequestKind::RelayEndDeviceConf => {
                relay_end_device_conf::device_needs_relay_end_device_conf_req(dev)
            }
            RequestKind::RelayUpdateUplinkList => {
                relay_update_uplink_list::device_needs_relay_update_uplink_list_req(dev)
            }
        }
    }

    pub fn enqueue(
        self,
        ctx: &MacContext,
        dev: &mut EndDevice,
        max_down_len: u16,
        max_up_len: u16,
        phy: &Band,
    ) -> Result<EnqueueState> {
        let (d, u) = (max_down_len, max_up_len);
        match self {
            RequestKind::DutyCycle => duty_cycle::enqueue_duty_cycle_req(ctx, dev, d, u, phy),
            RequestKind::RxParamSetup => {
                rx_param_setup::enqueue_rx_param_setup_req(ctx, dev, d, u, phy)
            }
            RequestKind::DevStatus => dev_status::enqueue_dev_status_req(ctx, dev, d, u, phy),
            RequestKind::NewChannel => new_channel::enqueue_new_channel_req(ctx, dev, d, u, phy),
            RequestKind::DlChannel => dl_channel::enqueue_dl_channel_req(ctx, dev, d, u, phy),
            RequestKind::RxTimingSetup => {
                rx_timing_setup::enqueue_rx_timing_setup_req(ctx, dev, d, u, phy)
            }
            RequestKind::PingSlotChannel => {
                ping_slot_channel::enqueue_ping_slot_channel_req(ctx, dev, d, u, phy)
            }
            RequestKind::BeaconFreq => beacon_freq::enqueue_beacon_freq_req(ctx, dev, d, u, phy),
            RequestKind::TxParamSetup => {
                tx_param_setup::enqueue_tx_param_setup_req(ctx, dev, d, u, phy)
            }
            RequestKind::LinkAdr => link_adr::enqueue_link_adr_req(ctx, dev, d, u, phy),
            RequestKind::AdrParamSetup => {
                adr_param_setup::enqueue_adr_param_setup_req(ctx, dev, d, u, phy)
            }
            RequestKind::RejoinParamSetup => {
                rejoin_param_setup::enqueue_rejoin_param_setup_req(ctx, dev, d, u, phy)
            }
            RequestKind::RelayConf => relay_conf::enqueue_relay_conf_req(ctx, dev, d, u, phy),
            RequestKind::RelayEndDeviceConf => {
                relay_end_device_conf::enqueue_relay_end_device_conf_req(ctx, dev, d, u, phy)
            }
            RequestKind::RelayUpdateUplinkList => {
                relay_update_uplink_list::enqueue_relay_update_uplink_list_req(ctx, dev, d, u, phy)
            }
        }
    }
}

/// MAC commands selected for one downlink
#[derive(Debug, Clone, PartialEq)]
pub struct MacDownlink {
    /// Responses followed by requests, in transmission order
    pub commands: Vec<DownlinkCommand>,
    pub events: Vec<MacEvent>,
    /// Downlink budget left for application payload
    pub max_down_len: u16,
    pub max_up_len: u16,
    /// `false` if a response was dropped or a request deferred
    pub ok: bool,
}

impl MacDownlink {
    /// Wire encoding of the selected commands
    pub fn encode(&self) -> Result<Bytes> {
        encode_downlink(&self.commands)
    }
}

/// Select the MAC commands of the next downlink
///
/// Requests pending from an earlier downlink were never answered and are
/// regenerated from the current state. On error the device is left
/// untouched.
pub fn enqueue_downlink(
    ctx: &MacContext,
    dev: &mut EndDevice,
    max_down_len: u16,
    max_up_len: u16,
    phy: &Band,
) -> Result<MacDownlink> {
    let mut out = MacDownlink {
        commands: Vec::new(),
        events: Vec::new(),
        max_down_len,
        max_up_len,
        ok: true,
    };

    let mut staged = dev.clone();
    let state = &mut staged.mac_state;
    if !state.pending_requests.is_empty() {
        debug!(
            "{} regenerating {} unanswered requests",
            staged.device_id,
            state.pending_requests.len()
        );
        state.pending_requests.clear();
    }

    // Responses in queue order; once one does not fit the rest is dropped
    let mut dropped = Vec::new();
    for cmd in state.queued_responses.drain(..) {
        let size = 1 + cmd.cid().downlink_len();
        if dropped.is_empty() && size <= out.max_down_len {
            out.max_down_len -= size;
            out.commands.push(cmd);
        } else {
            dropped.push(cmd.cid());
        }
    }
    if !dropped.is_empty() {
        warn!(
            "{} dropped {} responses that did not fit: {:?}",
            staged.device_id,
            dropped.len(),
            dropped
        );
        out.events.push(MacEvent::DropResponses { cids: dropped });
        out.ok = false;
    }

    for kind in DOWNLINK_REQUEST_ORDER {
        let st = kind.enqueue(ctx, &mut staged, out.max_down_len, out.max_up_len, phy)?;
        out.max_down_len = st.max_down_len;
        out.max_up_len = st.max_up_len;
        out.events.extend(st.queued_events);
        out.ok &= st.ok;
    }
    out.commands
        .extend(staged.mac_state.pending_requests.iter().cloned());

    *dev = staged;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::error::MacError;
    use crate::lorawan::commands::{DevStatusReq, LinkCheckAns, ResetConf};
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    #[test]
    fn test_order_covers_every_request_once() {
        let mut cids: Vec<Cid> = DOWNLINK_REQUEST_ORDER.iter().map(|k| k.cid()).collect();
        cids.sort();
        cids.dedup();
        assert_eq!(cids.len(), DOWNLINK_REQUEST_ORDER.len());
    }

    #[test]
    fn test_converged_device_gets_nothing() {
        let phy = band::by_id("EU_863_870").unwrap();
        let mut env = TestEnv::new("EU_863_870");
        env.defaults.global.status_count_periodicity = Some(0);
        env.defaults.global.status_time_periodicity = Some(0);
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        for kind in DOWNLINK_REQUEST_ORDER {
            assert!(!kind.device_needs(&env.ctx(), &dev, phy), "{:?}", kind);
        }
        let dl = enqueue_downlink(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert!(dl.ok);
        assert!(dl.commands.is_empty());
        assert_eq!(dl.max_down_len, 51);
    }

    #[test]
    fn test_responses_before_requests() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.desired_parameters.max_duty_cycle = 2;
        dev.mac_state.queued_responses = vec![DownlinkCommand::LinkCheckAns(LinkCheckAns {
            margin: 10,
            gateway_count: 1,
        })];

        let dl = enqueue_downlink(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert!(matches!(dl.commands[0], DownlinkCommand::LinkCheckAns(_)));
        assert!(matches!(dl.commands[1], DownlinkCommand::DutyCycleReq(_)));
        // DevStatusReq is due on a fresh device
        assert!(matches!(dl.commands[2], DownlinkCommand::DevStatusReq(_)));
        assert!(dev.mac_state.queued_responses.is_empty());
        assert_eq!(dl.encode().unwrap().len(), 3 + 2 + 1);
    }

    #[test]
    fn test_responses_that_do_not_fit_are_dropped() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_1, phy);
        dev.mac_state.queued_responses = vec![
            DownlinkCommand::LinkCheckAns(LinkCheckAns {
                margin: 10,
                gateway_count: 1,
            }),
            DownlinkCommand::ResetConf(ResetConf { minor_version: 1 }),
        ];
        let dl = enqueue_downlink(&env.ctx(), &mut dev, 4, 0, phy).unwrap();
        assert!(!dl.ok);
        assert_eq!(dl.commands.len(), 1);
        assert_eq!(dl.max_down_len, 1);
        assert!(dl.events.contains(&MacEvent::DropResponses {
            cids: vec![Cid::Reset]
        }));
    }

    #[test]
    fn test_error_leaves_device_untouched() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.desired_parameters.data_rate_index = 7;
        dev.mac_state.queued_responses = vec![DownlinkCommand::LinkCheckAns(LinkCheckAns {
            margin: 10,
            gateway_count: 1,
        })];
        let before = dev.clone();

        assert!(matches!(
            enqueue_downlink(&env.ctx(), &mut dev, 51, 51, phy),
            Err(MacError::CorruptedMacState(_))
        ));
        assert_eq!(dev, before);
        assert_eq!(dev.mac_state.queued_responses.len(), 1);
        assert!(dev.mac_state.pending_requests.is_empty());
    }

    #[test]
    fn test_stale_pending_requests_are_regenerated() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        dev.mac_state.pending_requests = vec![DownlinkCommand::DevStatusReq(DevStatusReq)];
        let dl = enqueue_downlink(&env.ctx(), &mut dev, 51, 51, phy).unwrap();
        assert_eq!(
            dl.commands,
            vec![DownlinkCommand::DevStatusReq(DevStatusReq)]
        );
        assert_eq!(dev.mac_state.pending_requests.len(), 1);
    }
}
