//! Device simulator
//!
//! Drives the MAC engine the way a network server would: every uplink goes
//! through [`handle_uplink`], every downlink through [`enqueue_downlink`],
//! and MAC commands cross the "air" as encoded bytes. The simulated radio
//! answers requests according to its [`RadioBehavior`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::band::Band;
use crate::error::{MacError, Result};
use crate::frequency_plan::FrequencyPlan;
use crate::lorawan::codec::{decode_downlink, decode_uplink, encode_uplink};
use crate::lorawan::commands::*;
use crate::lorawan::version::{NO_CHANGE_DATA_RATE_INDEX, NO_CHANGE_TX_POWER_INDEX};
use crate::lorawan::{DownlinkCommand, MacVersion, UplinkCommand};
use crate::mac::downlink::enqueue_downlink;
use crate::mac::uplink::{handle_uplink, RxMetadata, Uplink};
use crate::mac::{Defaults, EndDevice, MacContext, RelayKeyRequest, RelayKeyService};
use crate::timing::{backoff_until, time_on_air};

/// FHDR without FOpts plus FPort
const FRAME_OVERHEAD: u16 = 8;
const MAX_FOPTS_LEN: u16 = 15;
/// MHDR, FHDR, FPort and MIC around the application payload
const PHY_OVERHEAD: u16 = 13;
const APP_PAYLOAD_LEN: u16 = 12;
const SIM_GATEWAY_ID: &str = "sim-gateway";

/// How the simulated radio behaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioBehavior {
    /// SNR of every uplink at the gateway, dB
    pub snr: f32,
    /// dBm
    pub rssi: i16,
    pub reject_data_rates: BTreeSet<u8>,
    pub reject_tx_powers: BTreeSet<u8>,
    pub reject_frequencies: BTreeSet<u64>,
    /// Send LinkCheckReq every n uplinks; 0 never
    pub link_check_every: u32,
    /// Send DeviceTimeReq every n uplinks; 0 never
    pub device_time_every: u32,
    /// Send ResetInd in the first uplink
    pub reset_on_boot: bool,
    /// Announce this ping slot periodicity in the first uplink
    pub ping_slot_periodicity: Option<u8>,
}

impl Default for RadioBehavior {
    fn default() -> Self {
        Self {
            snr: 5.0,
            rssi: -90,
            reject_data_rates: BTreeSet::new(),
            reject_tx_powers: BTreeSet::new(),
            reject_frequencies: BTreeSet::new(),
            link_check_every: 0,
            device_time_every: 0,
            reset_on_boot: false,
            ping_slot_periodicity: None,
        }
    }
}

/// The end device side of the MAC protocol
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    version: MacVersion,
    behavior: RadioBehavior,
    f_cnt: u32,
    data_rate_index: u8,
    tx_power_index: u8,
    /// Uplink channel frequencies by channel index; 0 is unused
    frequencies: Vec<u64>,
    answers: Vec<UplinkCommand>,
}

impl SimulatedDevice {
    /// A radio booting with the current parameters of `dev`
    pub fn new(dev: &EndDevice, behavior: RadioBehavior) -> Self {
        let current = &dev.mac_state.current_parameters;
        Self {
            version: dev.lorawan_version,
            behavior,
            f_cnt: 0,
            data_rate_index: current.data_rate_index,
            tx_power_index: current.tx_power_index,
            frequencies: current
                .channels
                .iter()
                .map(|ch| if ch.enable_uplink { ch.uplink_frequency } else { 0 })
                .collect(),
            answers: Vec::new(),
        }
    }

    pub fn data_rate_index(&self) -> u8 {
        self.data_rate_index
    }

    pub fn tx_power_index(&self) -> u8 {
        self.tx_power_index
    }

    /// Process a MAC command stream received in a downlink
    pub fn receive_downlink(&mut self, payload: &[u8]) -> Result<()> {
        let cmds = decode_downlink(payload)?;
        // Any downlink stops the repetition of sticky answers
        self.answers.clear();

        let mut i = 0;
        while i < cmds.len() {
            if let DownlinkCommand::LinkAdrReq(_) = cmds[i] {
                let block: Vec<LinkAdrReq> = cmds[i..]
                    .iter()
                    .map_while(|cmd| match cmd {
                        DownlinkCommand::LinkAdrReq(req) => Some(req.clone()),
                        _ => None,
                    })
                    .collect();
                i += block.len();
                self.answer_link_adr(&block);
                continue;
            }
            if let Some(answer) = self.answer(&cmds[i]) {
                self.answers.push(answer);
            }
            i += 1;
        }
        Ok(())
    }

    fn answer_link_adr(&mut self, block: &[LinkAdrReq]) {
        let Some(last) = block.last() else {
            return;
        };
        let caps = self.version.capabilities();
        let dr_ack = Some(last.data_rate_index) == caps.no_change_data_rate_index
            || !self.behavior.reject_data_rates.contains(&last.data_rate_index);
        let power_ack = Some(last.tx_power_index) == caps.no_change_tx_power_index
            || !self.behavior.reject_tx_powers.contains(&last.tx_power_index);
        let ans = LinkAdrAns {
            channel_mask_ack: true,
            data_rate_index_ack: dr_ack,
            tx_power_index_ack: power_ack,
        };
        if dr_ack && power_ack {
            if last.data_rate_index != NO_CHANGE_DATA_RATE_INDEX {
                self.data_rate_index = last.data_rate_index;
            }
            if last.tx_power_index != NO_CHANGE_TX_POWER_INDEX {
                self.tx_power_index = last.tx_power_index;
            }
        }
        let count = if caps.link_adr_ans_per_request {
            block.len()
        } else {
            1
        };
        for _ in 0..count {
            self.answers.push(UplinkCommand::LinkAdrAns(ans.clone()));
        }
    }

    fn answer(&mut self, cmd: &DownlinkCommand) -> Option<UplinkCommand> {
        let answer = match cmd {
            DownlinkCommand::DutyCycleReq(_) => UplinkCommand::DutyCycleAns(DutyCycleAns),
            DownlinkCommand::RxParamSetupReq(_) => {
                UplinkCommand::RxParamSetupAns(RxParamSetupAns {
                    rx1_data_rate_offset_ack: true,
                    rx2_data_rate_index_ack: true,
                    rx2_frequency_ack: true,
                })
            }
            DownlinkCommand::DevStatusReq(_) => UplinkCommand::DevStatusAns(DevStatusAns {
                battery: 200,
                margin: (self.behavior.snr as i8).clamp(-32, 31),
            }),
            DownlinkCommand::NewChannelReq(req) => {
                let frequency_ack = !self.behavior.reject_frequencies.contains(&req.frequency);
                if frequency_ack {
                    let index = req.channel_index as usize;
                    if self.frequencies.len() <= index {
                        self.frequencies.resize(index + 1, 0);
                    }
                    self.frequencies[index] = req.frequency;
                }
                UplinkCommand::NewChannelAns(NewChannelAns {
                    frequency_ack,
                    data_rate_ack: true,
                })
            }
            DownlinkCommand::RxTimingSetupReq(_) => {
                UplinkCommand::RxTimingSetupAns(RxTimingSetupAns)
            }
            DownlinkCommand::TxParamSetupReq(_) => UplinkCommand::TxParamSetupAns(TxParamSetupAns),
            DownlinkCommand::DlChannelReq(_) => UplinkCommand::DlChannelAns(DlChannelAns {
                channel_index_ack: true,
                frequency_ack: true,
            }),
            DownlinkCommand::AdrParamSetupReq(_) => {
                UplinkCommand::AdrParamSetupAns(AdrParamSetupAns)
            }
            DownlinkCommand::RejoinParamSetupReq(_) => {
                UplinkCommand::RejoinParamSetupAns(RejoinParamSetupAns {
                    max_time_exponent_ack: true,
                })
            }
            DownlinkCommand::PingSlotChannelReq(_) => {
                UplinkCommand::PingSlotChannelAns(PingSlotChannelAns {
                    frequency_ack: true,
                    data_rate_index_ack: true,
                })
            }
            DownlinkCommand::BeaconFreqReq(_) => {
                UplinkCommand::BeaconFreqAns(BeaconFreqAns { frequency_ack: true })
            }
            DownlinkCommand::RelayConfReq(_) => UplinkCommand::RelayConfAns(RelayConfAns {
                second_channel_frequency_ack: true,
                second_channel_ack_offset_ack: true,
                second_channel_data_rate_index_ack: true,
                second_channel_index_ack: true,
                default_channel_index_ack: true,
                cad_periodicity_ack: true,
            }),
            DownlinkCommand::RelayEndDeviceConfReq(_) => {
                UplinkCommand::RelayEndDeviceConfAns(RelayEndDeviceConfAns {
                    second_channel_frequency_ack: true,
                    second_channel_data_rate_index_ack: true,
                    second_channel_index_ack: true,
                    backoff_ack: true,
                })
            }
            DownlinkCommand::RelayUpdateUplinkListReq(_) => {
                UplinkCommand::RelayUpdateUplinkListAns(RelayUpdateUplinkListAns)
            }
            DownlinkCommand::LinkAdrReq(_) => return None,
            other => {
                debug!("Simulated device received {}", other.cid());
                return None;
            }
        };
        Some(answer)
    }

    fn is_sticky(&self, cmd: &UplinkCommand) -> bool {
        self.version.capabilities().sticky_answers
            && matches!(
                cmd,
                UplinkCommand::RxParamSetupAns(_)
                    | UplinkCommand::RxTimingSetupAns(_)
                    | UplinkCommand::DlChannelAns(_)
            )
    }

    /// Build the next uplink, carrying the pending answers
    pub fn next_uplink(&mut self, now: DateTime<Utc>) -> Result<Uplink> {
        self.f_cnt += 1;
        let mut cmds = Vec::new();
        if self.f_cnt == 1 {
            if self.behavior.reset_on_boot {
                cmds.push(UplinkCommand::ResetInd(ResetInd { minor_version: 1 }));
            }
            if let Some(periodicity) = self.behavior.ping_slot_periodicity {
                cmds.push(UplinkCommand::PingSlotInfoReq(PingSlotInfoReq { periodicity }));
            }
        }
        cmds.extend(self.answers.iter().cloned());
        let sticky: Vec<UplinkCommand> = self
            .answers
            .iter()
            .filter(|cmd| self.is_sticky(cmd))
            .cloned()
            .collect();
        self.answers = sticky;

        let every = |n: u32| n != 0 && self.f_cnt % n == 0;
        if every(self.behavior.link_check_every) {
            cmds.push(UplinkCommand::LinkCheckReq(LinkCheckReq));
        }
        if every(self.behavior.device_time_every) {
            cmds.push(UplinkCommand::DeviceTimeReq(DeviceTimeReq));
        }

        // Over the air and back
        let mac_commands = decode_uplink(&encode_uplink(&cmds)?)?;
        Ok(Uplink {
            f_cnt: self.f_cnt,
            adr: true,
            data_rate_index: self.data_rate_index,
            frequency: self.next_frequency(),
            rx_metadata: vec![RxMetadata {
                gateway_id: SIM_GATEWAY_ID.to_string(),
                snr: self.behavior.snr,
                rssi: self.behavior.rssi,
            }],
            received_at: now,
            mac_commands,
        })
    }

    fn next_frequency(&self) -> u64 {
        let enabled: Vec<u64> = self.frequencies.iter().copied().filter(|&f| f != 0).collect();
        if enabled.is_empty() {
            return 0;
        }
        enabled[self.f_cnt as usize % enabled.len()]
    }
}

/// Derives relay keys by encrypting the session key id under a root key
#[derive(Clone)]
pub struct SimKeyStore {
    root_key: [u8; 16],
}

impl SimKeyStore {
    pub fn new(root_key: [u8; 16]) -> Self {
        Self { root_key }
    }

    /// Parse a 32 character hex root key
    pub fn from_hex(root_key: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(root_key)?;
        let root_key: [u8; 16] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("relay root key must be 16 bytes"))?;
        Ok(Self::new(root_key))
    }

    fn derive(&self, request: &RelayKeyRequest) -> anyhow::Result<[u8; 16]> {
        if request.session_key_id.is_empty() {
            anyhow::bail!("device {} has no session key id", request.device_id);
        }
        let mut block = [0u8; 16];
        for (i, b) in request.session_key_id.bytes().enumerate() {
            block[i % 16] ^= b;
        }
        let cipher = Aes128::new(&GenericArray::from(self.root_key));
        let mut block = GenericArray::from(block);
        cipher.encrypt_block(&mut block);
        let mut key = [0u8; 16];
        key.copy_from_slice(&block);
        Ok(key)
    }
}

impl RelayKeyService for SimKeyStore {
    fn batch_derive_root_wor_s_keys(
        &self,
        requests: &[RelayKeyRequest],
    ) -> anyhow::Result<Vec<[u8; 16]>> {
        requests.iter().map(|req| self.derive(req)).collect()
    }
}

/// Network side shared by all simulated devices
pub struct SimulationEnv {
    pub phy: &'static Band,
    pub frequency_plan: FrequencyPlan,
    pub defaults: Defaults,
    pub relay_keys: Arc<dyn RelayKeyService>,
    pub start: DateTime<Utc>,
    pub uplink_interval: Duration,
}

/// Outcome of a simulation run for one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub device: EndDevice,
    pub uplinks: u32,
    /// Event counts by event name
    pub events: BTreeMap<String, usize>,
    /// Downlinks where a response was dropped or a request deferred
    pub incomplete_downlinks: u32,
    /// Current parameters equal the desired ones and nothing is pending
    pub converged: bool,
    pub finished_at: DateTime<Utc>,
}

/// Downlink and uplink MAC budgets at the device's current data rate
fn mac_budget(phy: &Band, dev: &EndDevice) -> (u16, u16) {
    let params = &dev.mac_state.current_parameters;
    let capacity = |dwell: Option<bool>| {
        phy.data_rate(params.data_rate_index)
            .map_or(0, |dr| dr.max_mac_payload(dwell.unwrap_or(false)))
    };
    let budget = |max: u16| {
        max.saturating_sub(FRAME_OVERHEAD)
            .max(MAX_FOPTS_LEN.min(max.saturating_sub(FRAME_OVERHEAD - 1)))
    };
    (
        budget(capacity(params.downlink_dwell_time)),
        budget(capacity(params.uplink_dwell_time)),
    )
}

/// Run `cycles` uplink/downlink exchanges between the engine and a device
pub async fn run_device(
    env: Arc<SimulationEnv>,
    mut dev: EndDevice,
    mut radio: SimulatedDevice,
    cycles: u32,
) -> Result<DeviceReport> {
    let phy = env.phy;
    let mut report = DeviceReport {
        device: EndDevice::default(),
        uplinks: 0,
        events: BTreeMap::new(),
        incomplete_downlinks: 0,
        converged: false,
        finished_at: env.start,
    };
    let mut now = env.start;

    for _ in 0..cycles {
        let up = radio.next_uplink(now)?;
        let ctx = MacContext::new(
            now,
            &env.defaults,
            &env.frequency_plan,
            env.relay_keys.as_ref(),
        );
        let mut events = handle_uplink(&ctx, &mut dev, &up, phy)?;
        report.uplinks += 1;

        let (max_down_len, max_up_len) = mac_budget(phy, &dev);
        let dl = enqueue_downlink(&ctx, &mut dev, max_down_len, max_up_len, phy)?;
        if !dl.ok {
            report.incomplete_downlinks += 1;
        }
        if !dl.commands.is_empty() {
            let payload = dl.encode()?;
            debug!(
                "{} f_cnt {}: downlink {}",
                dev.device_id,
                up.f_cnt,
                hex::encode(&payload)
            );
            radio.receive_downlink(&payload)?;
        }
        events.extend(dl.events);
        for event in &events {
            *report.events.entry(event.name().to_string()).or_default() += 1;
        }

        let mac_len = up
            .mac_commands
            .iter()
            .map(|cmd| cmd.encoded_len())
            .sum::<u16>();
        let airtime = phy
            .data_rate(up.data_rate_index)
            .map(|dr| time_on_air(dr, PHY_OVERHEAD + mac_len + APP_PAYLOAD_LEN))
            .ok_or_else(|| {
                MacError::InvalidPayload(format!("uplink at undefined DR{}", up.data_rate_index))
            })?;
        let earliest = backoff_until(
            phy,
            up.frequency,
            dev.mac_state.current_parameters.max_duty_cycle,
            now,
            airtime,
        );
        now = (now + env.uplink_interval).max(earliest);
        tokio::task::yield_now().await;
    }

    let state = &dev.mac_state;
    report.converged = state.pending_requests.is_empty()
        && state.current_parameters == state.desired_parameters;
    if !report.converged {
        warn!(
            "{} not converged after {} uplinks ({} requests pending)",
            dev.device_id,
            report.uplinks,
            state.pending_requests.len()
        );
    }
    info!(
        "{} finished: DR{} power {} after {} uplinks",
        dev.device_id,
        state.current_parameters.data_rate_index,
        state.current_parameters.tx_power_index,
        report.uplinks
    );
    report.finished_at = now;
    report.device = dev;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band;
    use crate::mac::settings::new_state;
    use crate::mac::state::PowerState;
    use chrono::TimeZone;

    fn env(band_id: &str, plan: FrequencyPlan) -> Arc<SimulationEnv> {
        let phy = band::by_id(band_id).unwrap();
        Arc::new(SimulationEnv {
            phy,
            frequency_plan: plan,
            defaults: Defaults::default(),
            relay_keys: Arc::new(SimKeyStore::new([0x2b; 16])),
            start: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            uplink_interval: Duration::minutes(10),
        })
    }

    fn device(env: &SimulationEnv, version: MacVersion, supports_join: bool) -> EndDevice {
        let mut dev = EndDevice {
            device_id: "sim-device".to_string(),
            lorawan_version: version,
            supports_join,
            ..Default::default()
        };
        dev.mac_state = new_state(&dev, env.phy, &env.frequency_plan, &env.defaults).unwrap();
        dev
    }

    fn run(
        env: &Arc<SimulationEnv>,
        dev: EndDevice,
        radio: SimulatedDevice,
        cycles: u32,
    ) -> DeviceReport {
        tokio_test::block_on(run_device(env.clone(), dev, radio, cycles)).unwrap()
    }

    #[test]
    fn test_adr_converges() {
        let env = env("EU_863_870", FrequencyPlan::new("EU_863_870"));
        let dev = device(&env, MacVersion::V1_0_3, true);
        let radio = SimulatedDevice::new(&dev, RadioBehavior::default());

        let report = run(&env, dev, radio, 5);
        let current = &report.device.mac_state.current_parameters;
        // SF12 floor -20 dB, 5 dB SNR, 15 dB margin: three steps
        assert_eq!(current.data_rate_index, 3);
        assert_eq!(current.tx_power_index, 0);
        assert!(report.converged);
        assert!(matches!(
            report.device.power_state,
            PowerState::Battery { .. }
        ));
        assert_eq!(report.events.get("receive_reject"), None);
        assert!(report.finished_at > env.start);
    }

    #[test]
    fn test_rejected_data_rate_is_skipped() {
        let env = env("EU_863_870", FrequencyPlan::new("EU_863_870"));
        let dev = device(&env, MacVersion::V1_0_4, true);
        let behavior = RadioBehavior {
            reject_data_rates: [3].into_iter().collect(),
            ..Default::default()
        };
        let radio = SimulatedDevice::new(&dev, behavior);

        let report = run(&env, dev, radio, 6);
        let state = &report.device.mac_state;
        assert!(state.rejected_adr_data_rate_indexes.contains(&3));
        assert_eq!(state.current_parameters.data_rate_index, 4);
        assert_eq!(report.events.get("receive_reject"), Some(&1));
    }

    #[test]
    fn test_converged_device_stays_quiet() {
        let env = env("EU_863_870", FrequencyPlan::new("EU_863_870"));
        let dev = device(&env, MacVersion::V1_0_3, true);
        let mut radio = SimulatedDevice::new(&dev, RadioBehavior::default());

        let first = tokio_test::block_on(run_device(env.clone(), dev, radio.clone(), 5)).unwrap();
        // Keep the radio in step with the device state
        radio.data_rate_index = first.device.mac_state.current_parameters.data_rate_index;
        radio.f_cnt = first.uplinks;
        let second = run(&env, first.device.clone(), radio, 5);
        assert_eq!(second.events.get("enqueue_request"), None);
        assert_eq!(
            second.device.mac_state.current_parameters,
            first.device.mac_state.current_parameters
        );
    }

    #[test]
    fn test_reset_restores_boot_parameters() {
        let env = env("EU_863_870", FrequencyPlan::new("EU_863_870"));
        let mut dev = device(&env, MacVersion::V1_1, false);
        dev.mac_state.current_parameters.rx1_delay = 5;
        let behavior = RadioBehavior {
            reset_on_boot: true,
            ..Default::default()
        };
        let radio = SimulatedDevice::new(&dev, behavior);

        let report = run(&env, dev, radio, 1);
        assert_eq!(report.events.get("receive_indication"), Some(&1));
        assert_eq!(report.events.get("enqueue_response"), Some(&1));
        assert_eq!(report.device.mac_state.current_parameters.rx1_delay, 1);
    }

    #[test]
    fn test_device_initiated_requests_are_answered() {
        let env = env("EU_863_870", FrequencyPlan::new("EU_863_870"));
        let dev = device(&env, MacVersion::V1_0_3, true);
        let behavior = RadioBehavior {
            link_check_every: 1,
            device_time_every: 2,
            ..Default::default()
        };
        let radio = SimulatedDevice::new(&dev, behavior);

        let report = run(&env, dev, radio, 2);
        assert_eq!(report.events.get("receive_indication"), Some(&3));
        assert_eq!(report.events.get("enqueue_response"), Some(&3));
    }

    #[test]
    fn test_us915_sub_band_per_request_answers() {
        let plan = FrequencyPlan {
            sub_band: Some(2),
            ..FrequencyPlan::new("US_902_928")
        };
        let env = env("US_902_928", plan);
        let dev = device(&env, MacVersion::V1_0_2, false);
        let behavior = RadioBehavior {
            snr: 8.0,
            ..Default::default()
        };
        let radio = SimulatedDevice::new(&dev, behavior);

        // SF10 floor -15 dB: DR0 to DR2, then DR2 to DR3
        let report = run(&env, dev, radio, 4);
        let channels = &report.device.mac_state.current_parameters.channels;
        let enabled: Vec<usize> = channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.enable_uplink)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(enabled, vec![8, 9, 10, 11, 12, 13, 14, 15, 65]);
        assert_eq!(report.device.mac_state.current_parameters.data_rate_index, 3);
    }

    #[test]
    fn test_sticky_answers_repeat_until_downlink() {
        let dev = EndDevice {
            lorawan_version: MacVersion::V1_0_3,
            ..Default::default()
        };
        let mut radio = SimulatedDevice::new(&dev, RadioBehavior::default());
        let payload = crate::lorawan::codec::encode_downlink(&[
            DownlinkCommand::RxTimingSetupReq(RxTimingSetupReq { delay: 2 }),
            DownlinkCommand::DutyCycleReq(DutyCycleReq { max_duty_cycle: 1 }),
        ])
        .unwrap();
        radio.receive_downlink(&payload).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(radio.next_uplink(now).unwrap().mac_commands.len(), 2);
        assert_eq!(
            radio.next_uplink(now).unwrap().mac_commands,
            vec![UplinkCommand::RxTimingSetupAns(RxTimingSetupAns)]
        );
        radio.receive_downlink(&[]).unwrap();
        assert!(radio.next_uplink(now).unwrap().mac_commands.is_empty());
    }

    #[test]
    fn test_key_store() {
        let keys = SimKeyStore::from_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let req = |id: &str| RelayKeyRequest {
            device_id: "served".to_string(),
            session_key_id: id.to_string(),
        };
        let derived = keys
            .batch_derive_root_wor_s_keys(&[req("a"), req("b"), req("a")])
            .unwrap();
        assert_eq!(derived[0], derived[2]);
        assert_ne!(derived[0], derived[1]);
        assert!(keys.batch_derive_root_wor_s_keys(&[req("")]).is_err());
        assert!(SimKeyStore::from_hex("2b7e").is_err());
    }
}
