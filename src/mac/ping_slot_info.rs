//! PingSlotInfoReq (device-initiated, Class B)

use tracing::debug;

use crate::error::{MacError, Result};
use crate::lorawan::commands::{PingSlotInfoAns, PingSlotInfoReq};
use crate::lorawan::{DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{queue_response, MacContext};

/// Largest periodicity exponent (128 slots every 2^7 seconds)
pub const MAX_PING_SLOT_PERIODICITY: u8 = 7;

pub fn handle_ping_slot_info_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&PingSlotInfoReq>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let version = dev.mac_state.lorawan_version;
    if !version.capabilities().class_b {
        return Err(MacError::InvalidPayload(format!(
            "PingSlotInfoReq is not defined in LoRaWAN {}",
            version
        )));
    }
    if pld.periodicity > MAX_PING_SLOT_PERIODICITY {
        return Err(MacError::InvalidPayload(format!(
            "ping slot periodicity {} out of range",
            pld.periodicity
        )));
    }
    debug!(
        "{} ping slot periodicity {}",
        dev.device_id, pld.periodicity
    );
    dev.mac_state.ping_slot_periodicity = Some(pld.periodicity);
    Ok(vec![
        MacEvent::ReceiveIndication {
            command: UplinkCommand::PingSlotInfoReq(pld.clone()),
        },
        queue_response(
            &mut dev.mac_state,
            DownlinkCommand::PingSlotInfoAns(PingSlotInfoAns),
        ),
    ])
}
