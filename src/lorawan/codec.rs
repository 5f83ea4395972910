//! MAC command codec
//!
//! Encodes and decodes MAC command streams as carried in FOpts or in an
//! FRMPayload on FPort 0. Every command is a CID byte followed by a fixed
//! payload whose length is given by [`Cid::downlink_len`] or
//! [`Cid::uplink_len`].
//!
//! Frequencies are sent as 24-bit little-endian values in units of 100 Hz.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::Duration;

use super::commands::*;
use super::{Cid, DevAddr, DeviceClass};
use crate::error::{MacError, Result};
use crate::timing::gps;

/// Reload rate meaning "no forwarding limit" in RelayUpdateUplinkListReq
const RELAY_NO_FORWARD_LIMIT: u8 = 0x3F;

/// Encode server → device commands into a MAC command stream
pub fn encode_downlink(cmds: &[DownlinkCommand]) -> Result<Bytes> {
    let len = cmds.iter().map(|c| c.encoded_len() as usize).sum();
    let mut buf = BytesMut::with_capacity(len);
    for cmd in cmds {
        encode_downlink_command(cmd, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Encode device → server commands into a MAC command stream
pub fn encode_uplink(cmds: &[UplinkCommand]) -> Result<Bytes> {
    let len = cmds.iter().map(|c| c.encoded_len() as usize).sum();
    let mut buf = BytesMut::with_capacity(len);
    for cmd in cmds {
        encode_uplink_command(cmd, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Decode a device → server MAC command stream
pub fn decode_uplink(data: &[u8]) -> Result<Vec<UplinkCommand>> {
    let mut buf = data;
    let mut cmds = Vec::new();
    while buf.has_remaining() {
        let cid = Cid::try_from(buf.get_u8())?;
        ensure_remaining(buf, cid, cid.uplink_len())?;
        cmds.push(decode_uplink_command(cid, &mut buf)?);
    }
    Ok(cmds)
}

/// Decode a server → device MAC command stream
pub fn decode_downlink(data: &[u8]) -> Result<Vec<DownlinkCommand>> {
    let mut buf = data;
    let mut cmds = Vec::new();
    while buf.has_remaining() {
        let cid = Cid::try_from(buf.get_u8())?;
        ensure_remaining(buf, cid, cid.downlink_len())?;
        cmds.push(decode_downlink_command(cid, &mut buf)?);
    }
    Ok(cmds)
}

fn ensure_remaining(buf: &[u8], cid: Cid, len: u16) -> Result<()> {
    if buf.len() < len as usize {
        return Err(MacError::Encoding(format!(
            "{} needs {} bytes, {} left",
            cid,
            len,
            buf.len()
        )));
    }
    Ok(())
}

fn put_frequency(buf: &mut BytesMut, frequency: u64) -> Result<()> {
    if frequency % 100 != 0 || frequency / 100 > 0xFF_FFFF {
        return Err(MacError::Encoding(format!(
            "frequency {} Hz cannot be encoded",
            frequency
        )));
    }
    buf.put_uint_le(frequency / 100, 3);
    Ok(())
}

fn get_frequency(buf: &mut &[u8]) -> u64 {
    buf.get_uint_le(3) * 100
}

fn bit(byte: u8, n: u8) -> bool {
    byte & (1 << n) != 0
}

fn bits(flags: &[bool]) -> u8 {
    flags
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &f)| acc | ((f as u8) << i))
}

fn class_byte(class: DeviceClass) -> u8 {
    match class {
        DeviceClass::A => 0,
        DeviceClass::B => 1,
        DeviceClass::C => 2,
    }
}

/// ChannelSettings word shared by the relay configuration requests:
/// SecondChIdx(7) | SecondChDR(6:3) | SecondChAckOffset(2:0)
fn second_channel_bits(ch: Option<&RelaySecondChannel>) -> u16 {
    match ch {
        Some(ch) => {
            0x80 | ((ch.data_rate_index as u16 & 0x0F) << 3) | (ch.ack_offset as u16 & 0x07)
        }
        None => 0,
    }
}

fn second_channel_from_bits(settings: u16, frequency: u64) -> Option<RelaySecondChannel> {
    if settings & 0x80 == 0 {
        return None;
    }
    Some(RelaySecondChannel {
        ack_offset: (settings & 0x07) as u8,
        data_rate_index: ((settings >> 3) & 0x0F) as u8,
        frequency,
    })
}

fn encode_downlink_command(cmd: &DownlinkCommand, buf: &mut BytesMut) -> Result<()> {
    buf.put_u8(cmd.cid() as u8);
    match cmd {
        DownlinkCommand::ResetConf(c) => buf.put_u8(c.minor_version & 0x0F),
        DownlinkCommand::LinkCheckAns(c) => {
            buf.put_u8(c.margin);
            buf.put_u8(c.gateway_count);
        }
        DownlinkCommand::LinkAdrReq(c) => {
            buf.put_u8((c.data_rate_index << 4) | (c.tx_power_index & 0x0F));
            buf.put_u16_le(c.channel_mask);
            buf.put_u8(((c.channel_mask_control & 0x07) << 4) | (c.nb_trans & 0x0F));
        }
        DownlinkCommand::DutyCycleReq(c) => buf.put_u8(c.max_duty_cycle & 0x0F),
        DownlinkCommand::RxParamSetupReq(c) => {
            buf.put_u8(((c.rx1_data_rate_offset & 0x07) << 4) | (c.rx2_data_rate_index & 0x0F));
            put_frequency(buf, c.rx2_frequency)?;
        }
        DownlinkCommand::DevStatusReq(_) => {}
        DownlinkCommand::NewChannelReq(c) => {
            buf.put_u8(c.channel_index);
            put_frequency(buf, c.frequency)?;
            buf.put_u8((c.max_data_rate_index << 4) | (c.min_data_rate_index & 0x0F));
        }
        DownlinkCommand::RxTimingSetupReq(c) => buf.put_u8(c.delay & 0x0F),
        DownlinkCommand::TxParamSetupReq(c) => {
            buf.put_u8(
                ((c.downlink_dwell_time as u8) << 5)
                    | ((c.uplink_dwell_time as u8) << 4)
                    | (c.max_eirp_index & 0x0F),
            );
        }
        DownlinkCommand::DlChannelReq(c) => {
            buf.put_u8(c.channel_index);
            put_frequency(buf, c.frequency)?;
        }
        DownlinkCommand::RekeyConf(c) => buf.put_u8(c.minor_version & 0x0F),
        DownlinkCommand::AdrParamSetupReq(c) => {
            buf.put_u8((c.adr_ack_limit_exponent << 4) | (c.adr_ack_delay_exponent & 0x0F));
        }
        DownlinkCommand::DeviceTimeAns(c) => {
            let since_epoch = gps::to_gps(c.time);
            let secs = since_epoch.num_seconds();
            if !(0..=u32::MAX as i64).contains(&secs) {
                return Err(MacError::Encoding(format!(
                    "device time {} outside GPS range",
                    c.time
                )));
            }
            let millis = (since_epoch - Duration::seconds(secs)).num_milliseconds();
            buf.put_u32_le(secs as u32);
            buf.put_u8((millis * 256 / 1000) as u8);
        }
        DownlinkCommand::RejoinParamSetupReq(c) => {
            buf.put_u8((c.max_time_exponent << 4) | (c.max_count_exponent & 0x0F));
        }
        DownlinkCommand::PingSlotInfoAns(_) => {}
        DownlinkCommand::PingSlotChannelReq(c) => {
            put_frequency(buf, c.frequency)?;
            buf.put_u8(c.data_rate_index & 0x0F);
        }
        DownlinkCommand::BeaconFreqReq(c) => put_frequency(buf, c.frequency)?,
        DownlinkCommand::DeviceModeConf(c) => buf.put_u8(class_byte(c.class)),
        DownlinkCommand::RelayConfReq(c) => {
            // StartStop(13) | CADPeriodicity(12:10) | DefaultChIdx(9:8) | second channel(7:0)
            let (settings, frequency) = match &c.configuration {
                Some(conf) => (
                    (1 << 13)
                        | ((conf.cad_periodicity as u16 & 0x07) << 10)
                        | ((conf.default_channel_index as u16 & 0x03) << 8)
                        | second_channel_bits(conf.second_channel.as_ref()),
                    conf.second_channel.as_ref().map_or(0, |ch| ch.frequency),
                ),
                None => (0, 0),
            };
            buf.put_u16_le(settings);
            put_frequency(buf, frequency)?;
        }
        DownlinkCommand::RelayEndDeviceConfReq(c) => {
            // ActivationRelayMode: SmartEnableLevel(3:2) | RelayMode(1:0)
            // ChannelSettingsED: Backoff(13:8) | second channel(7:0)
            let (activation, settings, frequency) = match &c.configuration {
                Some(conf) => {
                    let activation = match conf.mode {
                        ServedRelayMode::Always => 1,
                        ServedRelayMode::Dynamic { smart_enable_level } => {
                            2 | ((smart_enable_level & 0x03) << 2)
                        }
                        ServedRelayMode::EndDeviceControlled => 3,
                    };
                    (
                        activation,
                        ((conf.backoff as u16 & 0x3F) << 8)
                            | second_channel_bits(conf.second_channel.as_ref()),
                        conf.second_channel.as_ref().map_or(0, |ch| ch.frequency),
                    )
                }
                None => (0, 0, 0),
            };
            buf.put_u8(activation);
            buf.put_u16_le(settings);
            put_frequency(buf, frequency)?;
        }
        DownlinkCommand::RelayUpdateUplinkListReq(c) => {
            buf.put_u8(c.rule_index & 0x0F);
            let limit = match c.forward_limits {
                Some(l) => ((l.bucket_size & 0x03) << 6) | (l.reload_rate & 0x3F),
                None => RELAY_NO_FORWARD_LIMIT,
            };
            buf.put_u8(limit);
            buf.put_slice(&c.dev_addr.to_le_bytes());
            buf.put_u32_le(c.w_f_cnt);
            buf.put_slice(&c.root_wor_s_key);
        }
    }
    Ok(())
}

fn decode_downlink_command(cid: Cid, buf: &mut &[u8]) -> Result<DownlinkCommand> {
    let cmd = match cid {
        Cid::Reset => DownlinkCommand::ResetConf(ResetConf {
            minor_version: buf.get_u8() & 0x0F,
        }),
        Cid::LinkCheck => DownlinkCommand::LinkCheckAns(LinkCheckAns {
            margin: buf.get_u8(),
            gateway_count: buf.get_u8(),
        }),
        Cid::LinkAdr => {
            let dr_pow = buf.get_u8();
            let channel_mask = buf.get_u16_le();
            let redundancy = buf.get_u8();
            DownlinkCommand::LinkAdrReq(LinkAdrReq {
                data_rate_index: dr_pow >> 4,
                tx_power_index: dr_pow & 0x0F,
                channel_mask,
                channel_mask_control: (redundancy >> 4) & 0x07,
                nb_trans: redundancy & 0x0F,
            })
        }
        Cid::DutyCycle => DownlinkCommand::DutyCycleReq(DutyCycleReq {
            max_duty_cycle: buf.get_u8() & 0x0F,
        }),
        Cid::RxParamSetup => {
            let settings = buf.get_u8();
            DownlinkCommand::RxParamSetupReq(RxParamSetupReq {
                rx1_data_rate_offset: (settings >> 4) & 0x07,
                rx2_data_rate_index: settings & 0x0F,
                rx2_frequency: get_frequency(buf),
            })
        }
        Cid::DevStatus => DownlinkCommand::DevStatusReq(DevStatusReq),
        Cid::NewChannel => {
            let channel_index = buf.get_u8();
            let frequency = get_frequency(buf);
            let range = buf.get_u8();
            DownlinkCommand::NewChannelReq(NewChannelReq {
                channel_index,
                frequency,
                min_data_rate_index: range & 0x0F,
                max_data_rate_index: range >> 4,
            })
        }
        Cid::RxTimingSetup => DownlinkCommand::RxTimingSetupReq(RxTimingSetupReq {
            delay: buf.get_u8() & 0x0F,
        }),
        Cid::TxParamSetup => {
            let b = buf.get_u8();
            DownlinkCommand::TxParamSetupReq(TxParamSetupReq {
                max_eirp_index: b & 0x0F,
                uplink_dwell_time: bit(b, 4),
                downlink_dwell_time: bit(b, 5),
            })
        }
        Cid::DlChannel => DownlinkCommand::DlChannelReq(DlChannelReq {
            channel_index: buf.get_u8(),
            frequency: get_frequency(buf),
        }),
        Cid::Rekey => DownlinkCommand::RekeyConf(RekeyConf {
            minor_version: buf.get_u8() & 0x0F,
        }),
        Cid::AdrParamSetup => {
            let b = buf.get_u8();
            DownlinkCommand::AdrParamSetupReq(AdrParamSetupReq {
                adr_ack_limit_exponent: b >> 4,
                adr_ack_delay_exponent: b & 0x0F,
            })
        }
        Cid::DeviceTime => {
            let secs = buf.get_u32_le() as i64;
            let frac = buf.get_u8() as i64;
            let since_epoch = Duration::seconds(secs) + Duration::milliseconds(frac * 1000 / 256);
            DownlinkCommand::DeviceTimeAns(DeviceTimeAns {
                time: gps::from_gps(since_epoch),
            })
        }
        Cid::RejoinParamSetup => {
            let b = buf.get_u8();
            DownlinkCommand::RejoinParamSetupReq(RejoinParamSetupReq {
                max_count_exponent: b & 0x0F,
                max_time_exponent: b >> 4,
            })
        }
        Cid::PingSlotInfo => DownlinkCommand::PingSlotInfoAns(PingSlotInfoAns),
        Cid::PingSlotChannel => DownlinkCommand::PingSlotChannelReq(PingSlotChannelReq {
            frequency: get_frequency(buf),
            data_rate_index: buf.get_u8() & 0x0F,
        }),
        Cid::BeaconFreq => DownlinkCommand::BeaconFreqReq(BeaconFreqReq {
            frequency: get_frequency(buf),
        }),
        Cid::DeviceMode => DownlinkCommand::DeviceModeConf(DeviceModeConf {
            class: DeviceClass::try_from(buf.get_u8())?,
        }),
        Cid::RelayConf => {
            let settings = buf.get_u16_le();
            let frequency = get_frequency(buf);
            let configuration = (settings & (1 << 13) != 0).then(|| ServingRelayConfig {
                second_channel: second_channel_from_bits(settings, frequency),
                default_channel_index: ((settings >> 8) & 0x03) as u8,
                cad_periodicity: ((settings >> 10) & 0x07) as u8,
            });
            DownlinkCommand::RelayConfReq(RelayConfReq { configuration })
        }
        Cid::RelayEndDeviceConf => {
            let activation = buf.get_u8();
            let settings = buf.get_u16_le();
            let frequency = get_frequency(buf);
            let mode = match activation & 0x03 {
                0 => None,
                1 => Some(ServedRelayMode::Always),
                2 => Some(ServedRelayMode::Dynamic {
                    smart_enable_level: (activation >> 2) & 0x03,
                }),
                _ => Some(ServedRelayMode::EndDeviceControlled),
            };
            let configuration = mode.map(|mode| ServedRelayConfig {
                mode,
                backoff: ((settings >> 8) & 0x3F) as u8,
                second_channel: second_channel_from_bits(settings, frequency),
            });
            DownlinkCommand::RelayEndDeviceConfReq(RelayEndDeviceConfReq { configuration })
        }
        Cid::RelayUpdateUplinkList => {
            let rule_index = buf.get_u8() & 0x0F;
            let limit = buf.get_u8();
            let dev_addr = DevAddr(buf.get_u32_le());
            let w_f_cnt = buf.get_u32_le();
            let mut root_wor_s_key = [0u8; 16];
            buf.copy_to_slice(&mut root_wor_s_key);
            let forward_limits = (limit != RELAY_NO_FORWARD_LIMIT).then_some(RelayForwardLimits {
                bucket_size: limit >> 6,
                reload_rate: limit & 0x3F,
            });
            DownlinkCommand::RelayUpdateUplinkListReq(RelayUpdateUplinkListReq {
                rule_index,
                forward_limits,
                dev_addr,
                w_f_cnt,
                root_wor_s_key,
            })
        }
    };
    Ok(cmd)
}

fn encode_uplink_command(cmd: &UplinkCommand, buf: &mut BytesMut) -> Result<()> {
    buf.put_u8(cmd.cid() as u8);
    match cmd {
        UplinkCommand::ResetInd(c) => buf.put_u8(c.minor_version & 0x0F),
        UplinkCommand::LinkCheckReq(_) => {}
        UplinkCommand::LinkAdrAns(c) => buf.put_u8(bits(&[
            c.channel_mask_ack,
            c.data_rate_index_ack,
            c.tx_power_index_ack,
        ])),
        UplinkCommand::DutyCycleAns(_) => {}
        UplinkCommand::RxParamSetupAns(c) => buf.put_u8(bits(&[
            c.rx2_frequency_ack,
            c.rx2_data_rate_index_ack,
            c.rx1_data_rate_offset_ack,
        ])),
        UplinkCommand::DevStatusAns(c) => {
            if !(-32..=31).contains(&c.margin) {
                return Err(MacError::Encoding(format!(
                    "DevStatusAns margin {} outside -32..=31",
                    c.margin
                )));
            }
            buf.put_u8(c.battery);
            buf.put_u8((c.margin as u8) & 0x3F);
        }
        UplinkCommand::NewChannelAns(c) => {
            buf.put_u8(bits(&[c.frequency_ack, c.data_rate_ack]))
        }
        UplinkCommand::RxTimingSetupAns(_) => {}
        UplinkCommand::TxParamSetupAns(_) => {}
        UplinkCommand::DlChannelAns(c) => {
            buf.put_u8(bits(&[c.channel_index_ack, c.frequency_ack]))
        }
        UplinkCommand::RekeyInd(c) => buf.put_u8(c.minor_version & 0x0F),
        UplinkCommand::AdrParamSetupAns(_) => {}
        UplinkCommand::DeviceTimeReq(_) => {}
        UplinkCommand::RejoinParamSetupAns(c) => buf.put_u8(c.max_time_exponent_ack as u8),
        UplinkCommand::PingSlotInfoReq(c) => buf.put_u8(c.periodicity & 0x07),
        UplinkCommand::PingSlotChannelAns(c) => {
            buf.put_u8(bits(&[c.frequency_ack, c.data_rate_index_ack]))
        }
        UplinkCommand::BeaconFreqAns(c) => buf.put_u8(c.frequency_ack as u8),
        UplinkCommand::DeviceModeInd(c) => buf.put_u8(class_byte(c.class)),
        UplinkCommand::RelayConfAns(c) => buf.put_u8(bits(&[
            c.second_channel_frequency_ack,
            c.second_channel_ack_offset_ack,
            c.second_channel_data_rate_index_ack,
            c.second_channel_index_ack,
            c.default_channel_index_ack,
            c.cad_periodicity_ack,
        ])),
        UplinkCommand::RelayEndDeviceConfAns(c) => buf.put_u8(bits(&[
            c.second_channel_frequency_ack,
            c.second_channel_data_rate_index_ack,
            c.second_channel_index_ack,
            c.backoff_ack,
        ])),
        UplinkCommand::RelayUpdateUplinkListAns(_) => {}
    }
    Ok(())
}

fn decode_uplink_command(cid: Cid, buf: &mut &[u8]) -> Result<UplinkCommand> {
    let cmd = match cid {
        Cid::Reset => UplinkCommand::ResetInd(ResetInd {
            minor_version: buf.get_u8() & 0x0F,
        }),
        Cid::LinkCheck => UplinkCommand::LinkCheckReq(LinkCheckReq),
        Cid::LinkAdr => {
            let b = buf.get_u8();
            UplinkCommand::LinkAdrAns(LinkAdrAns {
                channel_mask_ack: bit(b, 0),
                data_rate_index_ack: bit(b, 1),
                tx_power_index_ack: bit(b, 2),
            })
        }
        Cid::DutyCycle => UplinkCommand::DutyCycleAns(DutyCycleAns),
        Cid::RxParamSetup => {
            let b = buf.get_u8();
            UplinkCommand::RxParamSetupAns(RxParamSetupAns {
                rx2_frequency_ack: bit(b, 0),
                rx2_data_rate_index_ack: bit(b, 1),
                rx1_data_rate_offset_ack: bit(b, 2),
            })
        }
        Cid::DevStatus => {
            let battery = buf.get_u8();
            // 6-bit two's complement
            let raw = buf.get_u8() & 0x3F;
            let margin = ((raw << 2) as i8) >> 2;
            UplinkCommand::DevStatusAns(DevStatusAns { battery, margin })
        }
        Cid::NewChannel => {
            let b = buf.get_u8();
            UplinkCommand::NewChannelAns(NewChannelAns {
                frequency_ack: bit(b, 0),
                data_rate_ack: bit(b, 1),
            })
        }
        Cid::RxTimingSetup => UplinkCommand::RxTimingSetupAns(RxTimingSetupAns),
        Cid::TxParamSetup => UplinkCommand::TxParamSetupAns(TxParamSetupAns),
        Cid::DlChannel => {
            let b = buf.get_u8();
            UplinkCommand::DlChannelAns(DlChannelAns {
                channel_index_ack: bit(b, 0),
                frequency_ack: bit(b, 1),
            })
        }
        Cid::Rekey => UplinkCommand::RekeyInd(RekeyInd {
            minor_version: buf.get_u8() & 0x0F,
        }),
        Cid::AdrParamSetup => UplinkCommand::AdrParamSetupAns(AdrParamSetupAns),
        Cid::DeviceTime => UplinkCommand::DeviceTimeReq(DeviceTimeReq),
        Cid::RejoinParamSetup => UplinkCommand::RejoinParamSetupAns(RejoinParamSetupAns {
            max_time_exponent_ack: bit(buf.get_u8(), 0),
        }),
        Cid::PingSlotInfo => UplinkCommand::PingSlotInfoReq(PingSlotInfoReq {
            periodicity: buf.get_u8() & 0x07,
        }),
        Cid::PingSlotChannel => {
            let b = buf.get_u8();
            UplinkCommand::PingSlotChannelAns(PingSlotChannelAns {
                frequency_ack: bit(b, 0),
                data_rate_index_ack: bit(b, 1),
            })
        }
        Cid::BeaconFreq => UplinkCommand::BeaconFreqAns(BeaconFreqAns {
            frequency_ack: bit(buf.get_u8(), 0),
        }),
        Cid::DeviceMode => UplinkCommand::DeviceModeInd(DeviceModeInd {
            class: DeviceClass::try_from(buf.get_u8())?,
        }),
        Cid::RelayConf => {
            let b = buf.get_u8();
            UplinkCommand::RelayConfAns(RelayConfAns {
                second_channel_frequency_ack: bit(b, 0),
                second_channel_ack_offset_ack: bit(b, 1),
                second_channel_data_rate_index_ack: bit(b, 2),
                second_channel_index_ack: bit(b, 3),
                default_channel_index_ack: bit(b, 4),
                cad_periodicity_ack: bit(b, 5),
            })
        }
        Cid::RelayEndDeviceConf => {
            let b = buf.get_u8();
            UplinkCommand::RelayEndDeviceConfAns(RelayEndDeviceConfAns {
                second_channel_frequency_ack: bit(b, 0),
                second_channel_data_rate_index_ack: bit(b, 1),
                second_channel_index_ack: bit(b, 2),
                backoff_ack: bit(b, 3),
            })
        }
        Cid::RelayUpdateUplinkList => {
            UplinkCommand::RelayUpdateUplinkListAns(RelayUpdateUplinkListAns)
        }
    };
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_downlinks() -> Vec<DownlinkCommand> {
        vec![
            DownlinkCommand::ResetConf(ResetConf { minor_version: 1 }),
            DownlinkCommand::LinkCheckAns(LinkCheckAns {
                margin: 20,
                gateway_count: 3,
            }),
            DownlinkCommand::LinkAdrReq(LinkAdrReq {
                data_rate_index: 5,
                tx_power_index: 2,
                channel_mask: 0x00FF,
                channel_mask_control: 0,
                nb_trans: 1,
            }),
            DownlinkCommand::DutyCycleReq(DutyCycleReq { max_duty_cycle: 7 }),
            DownlinkCommand::RxParamSetupReq(RxParamSetupReq {
                rx1_data_rate_offset: 1,
                rx2_data_rate_index: 3,
                rx2_frequency: 869_525_000,
            }),
            DownlinkCommand::DevStatusReq(DevStatusReq),
            DownlinkCommand::NewChannelReq(NewChannelReq {
                channel_index: 3,
                frequency: 867_100_000,
                min_data_rate_index: 0,
                max_data_rate_index: 5,
            }),
            DownlinkCommand::RxTimingSetupReq(RxTimingSetupReq { delay: 5 }),
            DownlinkCommand::TxParamSetupReq(TxParamSetupReq {
                max_eirp_index: 5,
                uplink_dwell_time: true,
                downlink_dwell_time: false,
            }),
            DownlinkCommand::DlChannelReq(DlChannelReq {
                channel_index: 3,
                frequency: 868_100_000,
            }),
            DownlinkCommand::RekeyConf(RekeyConf { minor_version: 1 }),
            DownlinkCommand::AdrParamSetupReq(AdrParamSetupReq {
                adr_ack_limit_exponent: 6,
                adr_ack_delay_exponent: 5,
            }),
            DownlinkCommand::DeviceTimeAns(DeviceTimeAns {
                time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            }),
            DownlinkCommand::RejoinParamSetupReq(RejoinParamSetupReq {
                max_count_exponent: 10,
                max_time_exponent: 12,
            }),
            DownlinkCommand::PingSlotInfoAns(PingSlotInfoAns),
            DownlinkCommand::PingSlotChannelReq(PingSlotChannelReq {
                frequency: 869_525_000,
                data_rate_index: 3,
            }),
            DownlinkCommand::BeaconFreqReq(BeaconFreqReq {
                frequency: 869_525_000,
            }),
            DownlinkCommand::DeviceModeConf(DeviceModeConf {
                class: DeviceClass::C,
            }),
            DownlinkCommand::RelayConfReq(RelayConfReq {
                configuration: Some(ServingRelayConfig {
                    second_channel: Some(RelaySecondChannel {
                        ack_offset: 2,
                        data_rate_index: 3,
                        frequency: 868_300_000,
                    }),
                    default_channel_index: 1,
                    cad_periodicity: 4,
                }),
            }),
            DownlinkCommand::RelayEndDeviceConfReq(RelayEndDeviceConfReq {
                configuration: Some(ServedRelayConfig {
                    mode: ServedRelayMode::Dynamic {
                        smart_enable_level: 2,
                    },
                    backoff: 12,
                    second_channel: None,
                }),
            }),
            DownlinkCommand::RelayUpdateUplinkListReq(RelayUpdateUplinkListReq {
                rule_index: 2,
                forward_limits: Some(RelayForwardLimits {
                    bucket_size: 1,
                    reload_rate: 10,
                }),
                dev_addr: DevAddr(0x01AB5678),
                w_f_cnt: 42,
                root_wor_s_key: [0x11; 16],
            }),
        ]
    }

    #[test]
    fn test_encoded_sizes_match_cid_table() {
        for cmd in sample_downlinks() {
            let encoded = encode_downlink(std::slice::from_ref(&cmd)).unwrap();
            assert_eq!(
                encoded.len(),
                1 + cmd.cid().downlink_len() as usize,
                "{}",
                cmd.cid()
            );
        }
    }

    #[test]
    fn test_link_adr_req_layout() {
        let cmd = DownlinkCommand::LinkAdrReq(LinkAdrReq {
            data_rate_index: 5,
            tx_power_index: 2,
            channel_mask: 0x00FF,
            channel_mask_control: 6,
            nb_trans: 1,
        });
        let encoded = encode_downlink(&[cmd]).unwrap();
        assert_eq!(&encoded[..], &[0x03, 0x52, 0xFF, 0x00, 0x61]);
    }

    #[test]
    fn test_downlink_stream_decodes_back() {
        let cmds = sample_downlinks();
        let encoded = encode_downlink(&cmds).unwrap();
        assert_eq!(decode_downlink(&encoded).unwrap(), cmds);
    }

    #[test]
    fn test_decode_uplink_stream() {
        // LinkADRAns all acked, DevStatusAns battery 200 margin -5, DeviceTimeReq
        let data = [0x03, 0x07, 0x06, 200, 0x3B, 0x0D];
        let cmds = decode_uplink(&data).unwrap();
        assert_eq!(
            cmds,
            vec![
                UplinkCommand::LinkAdrAns(LinkAdrAns {
                    channel_mask_ack: true,
                    data_rate_index_ack: true,
                    tx_power_index_ack: true,
                }),
                UplinkCommand::DevStatusAns(DevStatusAns {
                    battery: 200,
                    margin: -5,
                }),
                UplinkCommand::DeviceTimeReq(DeviceTimeReq),
            ]
        );
        assert_eq!(&encode_uplink(&cmds).unwrap()[..], &data);
    }

    #[test]
    fn test_decode_truncated_command() {
        assert!(matches!(
            decode_uplink(&[0x06, 0x10]),
            Err(MacError::Encoding(_))
        ));
        assert!(decode_uplink(&[0x0E]).is_err());
    }

    #[test]
    fn test_frequency_must_be_multiple_of_100hz() {
        let cmd = DownlinkCommand::BeaconFreqReq(BeaconFreqReq {
            frequency: 869_525_050,
        });
        assert!(encode_downlink(&[cmd]).is_err());
    }
}
