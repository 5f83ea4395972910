pub mod codec;
pub mod commands;
pub mod version;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MacError;

pub use commands::{DownlinkCommand, UplinkCommand};
pub use version::{capabilities, Capabilities, MacVersion};

/// LoRaWAN device address (32-bit, big-endian when written as hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DevAddr(pub u32);

impl DevAddr {
    /// Bytes as they appear on the air (little-endian)
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl FromStr for DevAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| MacError::Encoding(format!("invalid DevAddr '{}': {}", s, e)))?;
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| MacError::Encoding(format!("DevAddr '{}' is not 4 bytes", s)))?;
        Ok(DevAddr(u32::from_be_bytes(bytes)))
    }
}

impl TryFrom<String> for DevAddr {
    type Error = MacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DevAddr> for String {
    fn from(value: DevAddr) -> Self {
        value.to_string()
    }
}

/// LoRaWAN device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceClass {
    #[default]
    A,
    B,
    C,
}

impl TryFrom<u8> for DeviceClass {
    type Error = MacError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceClass::A),
            1 => Ok(DeviceClass::B),
            2 => Ok(DeviceClass::C),
            _ => Err(MacError::InvalidPayload(format!(
                "unknown device class 0x{:02x}",
                value
            ))),
        }
    }
}

/// MAC command identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Cid {
    Reset = 0x01,
    LinkCheck = 0x02,
    LinkAdr = 0x03,
    DutyCycle = 0x04,
    RxParamSetup = 0x05,
    DevStatus = 0x06,
    NewChannel = 0x07,
    RxTimingSetup = 0x08,
    TxParamSetup = 0x09,
    DlChannel = 0x0A,
    Rekey = 0x0B,
    AdrParamSetup = 0x0C,
    DeviceTime = 0x0D,
    RejoinParamSetup = 0x0F,
    PingSlotInfo = 0x10,
    PingSlotChannel = 0x11,
    BeaconFreq = 0x13,
    DeviceMode = 0x20,
    RelayConf = 0x40,
    RelayEndDeviceConf = 0x41,
    RelayUpdateUplinkList = 0x43,
}

impl Cid {
    /// Payload length (excluding the CID byte) of the server → device command
    pub fn downlink_len(self) -> u16 {
        match self {
            Cid::Reset => 1,
            Cid::LinkCheck => 2,
            Cid::LinkAdr => 4,
            Cid::DutyCycle => 1,
            Cid::RxParamSetup => 4,
            Cid::DevStatus => 0,
            Cid::NewChannel => 5,
            Cid::RxTimingSetup => 1,
            Cid::TxParamSetup => 1,
            Cid::DlChannel => 4,
            Cid::Rekey => 1,
            Cid::AdrParamSetup => 1,
            Cid::DeviceTime => 5,
            Cid::RejoinParamSetup => 1,
            Cid::PingSlotInfo => 0,
            Cid::PingSlotChannel => 4,
            Cid::BeaconFreq => 3,
            Cid::DeviceMode => 1,
            Cid::RelayConf => 5,
            Cid::RelayEndDeviceConf => 6,
            Cid::RelayUpdateUplinkList => 26,
        }
    }

    /// Payload length (excluding the CID byte) of the device → server command
    pub fn uplink_len(self) -> u16 {
        match self {
            Cid::Reset => 1,
            Cid::LinkCheck => 0,
            Cid::LinkAdr => 1,
            Cid::DutyCycle => 0,
            Cid::RxParamSetup => 1,
            Cid::DevStatus => 2,
            Cid::NewChannel => 1,
            Cid::RxTimingSetup => 0,
            Cid::TxParamSetup => 0,
            Cid::DlChannel => 1,
            Cid::Rekey => 1,
            Cid::AdrParamSetup => 0,
            Cid::DeviceTime => 0,
            Cid::RejoinParamSetup => 1,
            Cid::PingSlotInfo => 1,
            Cid::PingSlotChannel => 1,
            Cid::BeaconFreq => 1,
            Cid::DeviceMode => 1,
            Cid::RelayConf => 1,
            Cid::RelayEndDeviceConf => 1,
            Cid::RelayUpdateUplinkList => 0,
        }
    }
}

impl TryFrom<u8> for Cid {
    type Error = MacError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Cid::Reset),
            0x02 => Ok(Cid::LinkCheck),
            0x03 => Ok(Cid::LinkAdr),
            0x04 => Ok(Cid::DutyCycle),
            0x05 => Ok(Cid::RxParamSetup),
            0x06 => Ok(Cid::DevStatus),
            0x07 => Ok(Cid::NewChannel),
            0x08 => Ok(Cid::RxTimingSetup),
            0x09 => Ok(Cid::TxParamSetup),
            0x0A => Ok(Cid::DlChannel),
            0x0B => Ok(Cid::Rekey),
            0x0C => Ok(Cid::AdrParamSetup),
            0x0D => Ok(Cid::DeviceTime),
            0x0F => Ok(Cid::RejoinParamSetup),
            0x10 => Ok(Cid::PingSlotInfo),
            0x11 => Ok(Cid::PingSlotChannel),
            0x13 => Ok(Cid::BeaconFreq),
            0x20 => Ok(Cid::DeviceMode),
            0x40 => Ok(Cid::RelayConf),
            0x41 => Ok(Cid::RelayEndDeviceConf),
            0x43 => Ok(Cid::RelayUpdateUplinkList),
            _ => Err(MacError::Encoding(format!("unknown CID 0x{:02x}", value))),
        }
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cid::Reset => "Reset",
            Cid::LinkCheck => "LinkCheck",
            Cid::LinkAdr => "LinkADR",
            Cid::DutyCycle => "DutyCycle",
            Cid::RxParamSetup => "RXParamSetup",
            Cid::DevStatus => "DevStatus",
            Cid::NewChannel => "NewChannel",
            Cid::RxTimingSetup => "RXTimingSetup",
            Cid::TxParamSetup => "TXParamSetup",
            Cid::DlChannel => "DlChannel",
            Cid::Rekey => "Rekey",
            Cid::AdrParamSetup => "ADRParamSetup",
            Cid::DeviceTime => "DeviceTime",
            Cid::RejoinParamSetup => "RejoinParamSetup",
            Cid::PingSlotInfo => "PingSlotInfo",
            Cid::PingSlotChannel => "PingSlotChannel",
            Cid::BeaconFreq => "BeaconFreq",
            Cid::DeviceMode => "DeviceMode",
            Cid::RelayConf => "RelayConf",
            Cid::RelayEndDeviceConf => "RelayEndDeviceConf",
            Cid::RelayUpdateUplinkList => "RelayUpdateUplinkList",
        };
        write!(f, "{}(0x{:02X})", name, *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_addr_hex_roundtrip() {
        let addr: DevAddr = "01AB5678".parse().unwrap();
        assert_eq!(addr, DevAddr(0x01AB5678));
        assert_eq!(addr.to_string(), "01AB5678");
        assert_eq!(addr.to_le_bytes(), [0x78, 0x56, 0xAB, 0x01]);
    }

    #[test]
    fn test_dev_addr_rejects_bad_input() {
        assert!("01AB56".parse::<DevAddr>().is_err());
        assert!("zzzzzzzz".parse::<DevAddr>().is_err());
    }

    #[test]
    fn test_cid_from_byte() {
        assert_eq!(Cid::try_from(0x03).unwrap(), Cid::LinkAdr);
        assert_eq!(Cid::try_from(0x43).unwrap(), Cid::RelayUpdateUplinkList);
        assert!(Cid::try_from(0x0E).is_err());
        assert_eq!(Cid::LinkAdr.to_string(), "LinkADR(0x03)");
    }

    #[test]
    fn test_device_class_from_byte() {
        assert_eq!(DeviceClass::try_from(2).unwrap(), DeviceClass::C);
        assert!(DeviceClass::try_from(3).is_err());
    }
}
