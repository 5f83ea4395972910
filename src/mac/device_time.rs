//! DeviceTimeReq (device-initiated)

use crate::error::{MacError, Result};
use crate::lorawan::commands::{DeviceTimeAns, DeviceTimeReq};
use crate::lorawan::{DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::{queue_response, MacContext};

/// Answer with the network time at which the uplink was received
pub fn handle_device_time_req(
    ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&DeviceTimeReq>,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let version = dev.mac_state.lorawan_version;
    if !version.capabilities().device_time {
        return Err(MacError::InvalidPayload(format!(
            "DeviceTimeReq is not defined in LoRaWAN {}",
            version
        )));
    }
    Ok(vec![
        MacEvent::ReceiveIndication {
            command: UplinkCommand::DeviceTimeReq(pld.clone()),
        },
        queue_response(
            &mut dev.mac_state,
            DownlinkCommand::DeviceTimeAns(DeviceTimeAns { time: ctx.now }),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::lorawan::MacVersion;
    use crate::mac::test_util::TestEnv;

    #[test]
    fn test_answers_with_context_time() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        handle_device_time_req(&env.ctx(), &mut dev, Some(&DeviceTimeReq)).unwrap();
        assert_eq!(
            dev.mac_state.queued_responses,
            vec![DownlinkCommand::DeviceTimeAns(DeviceTimeAns { time: env.now })]
        );
    }

    #[test]
    fn test_no_payload() {
        let phy = band::by_id("EU_863_870").unwrap();
        let env = TestEnv::new("EU_863_870");
        let mut dev = env.device(MacVersion::V1_0_3, phy);
        assert!(matches!(
            handle_device_time_req(&env.ctx(), &mut dev, None),
            Err(MacError::NoPayload)
        ));
    }
}
