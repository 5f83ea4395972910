//! RekeyInd (device-initiated, LoRaWAN 1.1)

use tracing::{debug, info};

use crate::error::{MacError, Result};
use crate::lorawan::commands::{RekeyConf, RekeyInd};
use crate::lorawan::version::SERVER_MINOR_VERSION;
use crate::lorawan::{DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{queue_response, MacContext};

/// Activate the session derived at the last rejoin and confirm it
pub fn handle_rekey_ind(
    ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&RekeyInd>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let version = dev.mac_state.lorawan_version;
    if !version.capabilities().rekey {
        return Err(MacError::InvalidPayload(format!(
            "RekeyInd is not defined in LoRaWAN {}",
            version
        )));
    }
    match dev.pending_session.take() {
        Some(mut session) => {
            session.started_at.get_or_insert(ctx.now);
            info!("{} switched to session {}", dev.device_id, session.dev_addr);
            dev.session = session;
        }
        None => debug!("{} repeated RekeyInd", dev.device_id),
    }
    let conf = DownlinkCommand::RekeyConf(RekeyConf {
        minor_version: pld.minor_version.min(SERVER_MINOR_VERSION),
    });
    Ok(vec![
        MacEvent::ReceiveIndication {
            command: UplinkCommand::RekeyInd(pld.clone()),
        },
        queue_response(&mut dev.mac_state, conf),
    ])
}
