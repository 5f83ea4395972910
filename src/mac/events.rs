//! MAC events emitted for telemetry

use serde::{Deserialize, Serialize};

use crate::lorawan::{Cid, DownlinkCommand, UplinkCommand};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MacEvent {
    /// A request was added to the next downlink
    EnqueueRequest { command: DownlinkCommand },
    /// An answer or confirmation was added to the next downlink
    EnqueueResponse { command: DownlinkCommand },
    /// The device accepted a request
    ReceiveAccept { command: UplinkCommand },
    /// The device rejected a request, fully or partially
    ReceiveReject { command: UplinkCommand },
    /// The device sent a command on its own initiative
    ReceiveIndication { command: UplinkCommand },
    /// Pending requests left unanswered by an uplink
    DropRequests { cids: Vec<Cid> },
    /// Queued responses that did not fit the downlink
    DropResponses { cids: Vec<Cid> },
}

impl MacEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MacEvent::EnqueueRequest { .. } => "enqueue_request",
            MacEvent::EnqueueResponse { .. } => "enqueue_response",
            MacEvent::ReceiveAccept { .. } => "receive_accept",
            MacEvent::ReceiveReject { .. } => "receive_reject",
            MacEvent::ReceiveIndication { .. } => "receive_indication",
            MacEvent::DropRequests { .. } => "drop_requests",
            MacEvent::DropResponses { .. } => "drop_responses",
        }
    }

    /// Accept or reject event depending on `accepted`
    pub fn answer(accepted: bool, command: UplinkCommand) -> Self {
        if accepted {
            MacEvent::ReceiveAccept { command }
        } else {
            MacEvent::ReceiveReject { command }
        }
    }
}
