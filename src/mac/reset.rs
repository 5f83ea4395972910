//! ResetInd (device-initiated, LoRaWAN 1.1 ABP devices)

use tracing::{debug, info};

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{ResetConf, ResetInd};
use crate::lorawan::{DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::settings::new_state;
use crate::mac::state::EndDevice;
use crate::mac::{queue_response, MacContext};

/// Replace the MAC state with fresh defaults and confirm the reset
///
/// Devices that activate over the air rejoin instead of resetting, so their
/// ResetInd is ignored.
pub fn handle_reset_ind(
    ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&ResetInd>,
    phy: &Band,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let indication = MacEvent::ReceiveIndication {
        command: UplinkCommand::ResetInd(pld.clone()),
    };
    if dev.supports_join {
        debug!("{} supports join, ignoring ResetInd", dev.device_id);
        return Ok(vec![indication]);
    }
    let version = dev.mac_state.lorawan_version;
    if !version.capabilities().reset {
        return Err(MacError::InvalidPayload(format!(
            "ResetInd is not defined in LoRaWAN {}",
            version
        )));
    }

    dev.mac_state = new_state(dev, phy, ctx.frequency_plan, ctx.defaults)?;
    info!("{} reset its MAC state", dev.device_id);
    let conf = DownlinkCommand::ResetConf(ResetConf {
        minor_version: pld.minor_version,
    });
    Ok(vec![indication, queue_response(&mut dev.mac_state, conf)])
}
