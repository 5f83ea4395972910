//! LinkCheckReq (device-initiated)

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::lorawan::commands::{LinkCheckAns, LinkCheckReq};
use crate::lorawan::{DownlinkCommand, UplinkCommand};
use crate::mac::events::MacEvent;
use crate::mac::state::EndDevice;
use crate::mac::uplink::Uplink;
use crate::mac::{queue_response, MacContext};

/// Link margin in dB above the demodulation floor of the uplink data rate
///
/// FSK has no demodulation floor and always reports 0.
pub fn link_margin(up: &Uplink, phy: &Band) -> Result<u8> {
    let dr = phy.data_rate(up.data_rate_index).ok_or_else(|| {
        MacError::InvalidPayload(format!(
            "uplink data rate {} not defined in {}",
            up.data_rate_index, phy.id
        ))
    })?;
    let (Some(required), Some(snr)) = (dr.required_snr(), up.max_snr()) else {
        return Ok(0);
    };
    Ok((snr - required).clamp(0.0, 254.0) as u8)
}

pub fn handle_link_check_req(
    _ctx: &MacContext,
    dev: &mut EndDevice,
    pld: Option<&LinkCheckReq>,
    up: &Uplink,
    phy: &Band,
) -> Result<Vec<MacEvent>> {
    let pld = pld.ok_or(MacError::NoPayload)?;
    let ans = LinkCheckAns {
        margin: link_margin(up, phy)?,
        gateway_count: up.gateway_count().min(u8::MAX as usize) as u8,
    };
    Ok(vec![
        MacEvent::ReceiveIndication {
            command: UplinkCommand::LinkCheckReq(pld.clone()),
        },
        queue_response(&mut dev.mac_state, DownlinkCommand::LinkCheckAns(ans)),
    ])
}
