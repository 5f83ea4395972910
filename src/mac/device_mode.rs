//! DeviceModeInd (device-initiated, LoRaWAN 1.1)

use tracing::info;

use crate::error::{MacError, Result};
use crate::lorawan::commands::{DeviceModeConf, DeviceModeInd};
use crate::lorawan::{DeviceClass, DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{queue_response, MacContext};

pub fn handle_device_mode_ind(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&DeviceModeInd>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let version = dev.mac_state.lorawan_version;
    if !version.capabilities().device_mode {
        return Err(MacError::InvalidPayload(format!(
            "DeviceModeInd is not defined in LoRaWAN {}",
            version
        )));
    }
    // Class B is entered through beacon acquisition, never through DeviceModeInd
    if pld.class == DeviceClass::B {
        return Err(MacError::InvalidPayload(
            "DeviceModeInd cannot select class B".to_string(),
        ));
    }
    if dev.mac_state.device_class != pld.class {
        info!(
            "{} switched from class {:?} to {:?}",
            dev.device_id, dev.mac_state.device_class, pld.class
        );
        dev.mac_state.device_class = pld.class;
    }
    let conf = DownlinkCommand::DeviceModeConf(DeviceModeConf { class: pld.class });
    Ok(vec![
        MacEvent::ReceiveIndication {
            command: UplinkCommand::DeviceModeInd(pld.clone()),
        },
        queue_response(&mut dev.mac_state, conf),
    ])
}
