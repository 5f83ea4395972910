use serde::Deserialize;
use std::path::Path;

use crate::band::{self, Band};
use crate::frequency_plan::FrequencyPlan;
use crate::lorawan::{DevAddr, MacVersion};
use crate::mac::settings::new_state;
use crate::mac::state::{EndDevice, Session};
use crate::mac::{Defaults, MacSettings};
use crate::sim::RadioBehavior;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    pub band_id: String,
    /// Band defaults when absent
    #[serde(default)]
    pub frequency_plan: Option<FrequencyPlan>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Uplink/downlink exchanges per device
    pub cycles: u32,
    pub uplink_interval_secs: i64,
    /// Hex AES key the relay key store derives from
    pub relay_root_key: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycles: 20,
            uplink_interval_secs: 600,
            relay_root_key: "00000000000000000000000000000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    #[serde(default)]
    pub lorawan_version: MacVersion,
    #[serde(default)]
    pub dev_addr: DevAddr,
    #[serde(default = "default_supports_join")]
    pub supports_join: bool,
    #[serde(default)]
    pub mac_settings: MacSettings,
    #[serde(default)]
    pub radio: RadioBehavior,
}

fn default_supports_join() -> bool {
    true
}

impl DeviceConfig {
    /// A device with a fresh MAC state, as right after activation
    pub fn end_device(
        &self,
        phy: &Band,
        plan: &FrequencyPlan,
        defaults: &Defaults,
    ) -> anyhow::Result<EndDevice> {
        let mut dev = EndDevice {
            device_id: self.device_id.clone(),
            lorawan_version: self.lorawan_version,
            supports_join: self.supports_join,
            mac_settings: self.mac_settings.clone(),
            session: Session {
                dev_addr: self.dev_addr,
                keys_id: format!("{}-session", self.device_id),
                ..Default::default()
            },
            ..Default::default()
        };
        dev.mac_state = new_state(&dev, phy, plan, defaults)
            .map_err(|e| anyhow::anyhow!("MAC state for {}: {}", self.device_id, e))?;
        Ok(dev)
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.band()?;
        config.frequency_plan()?;
        Ok(config)
    }

    pub fn band(&self) -> anyhow::Result<&'static Band> {
        band::by_id(&self.network.band_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown band {}", self.network.band_id))
    }

    /// The configured frequency plan, checked against the band
    pub fn frequency_plan(&self) -> anyhow::Result<FrequencyPlan> {
        let phy = self.band()?;
        let plan = self
            .network
            .frequency_plan
            .clone()
            .unwrap_or_else(|| FrequencyPlan::new(&self.network.band_id));
        if plan.band_id != phy.id {
            anyhow::bail!(
                "Frequency plan is for {}, network band is {}",
                plan.band_id,
                phy.id
            );
        }
        plan.desired_channels(phy)?;
        Ok(plan)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            network: NetworkConfig {
                band_id: "EU_863_870".to_string(),
                frequency_plan: None,
            },
            defaults: Defaults::default(),
            simulation: SimulationConfig::default(),
            devices: vec![DeviceConfig {
                device_id: "device-1".to_string(),
                lorawan_version: MacVersion::V1_0_4,
                dev_addr: DevAddr(0x2601_1001),
                supports_join: true,
                mac_settings: MacSettings::default(),
                radio: RadioBehavior::default(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::AdrMode;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [logging]
            level = "debug"

            [network]
            band_id = "US_902_928"
            frequency_plan = { band_id = "US_902_928", sub_band = 2 }

            [defaults.global]
            desired_rx1_delay = 3

            [defaults.profile]
            adr = { mode = "static", data_rate_index = 2, tx_power_index = 1, nb_trans = 1 }

            [simulation]
            cycles = 5

            [[devices]]
            device_id = "meter-7"
            lorawan_version = "1.0.2"
            dev_addr = "26011234"
            supports_join = false
            mac_settings = { max_duty_cycle = 1 }
            radio = { snr = -3.5, reject_data_rates = [3] }
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.frequency_plan().unwrap().sub_band, Some(2));
        assert_eq!(config.defaults.global.desired_rx1_delay, Some(3));
        assert!(matches!(
            config.defaults.profile.as_ref().and_then(|p| p.adr.clone()),
            Some(AdrMode::Static { data_rate_index: 2, .. })
        ));
        assert_eq!(config.simulation.cycles, 5);
        assert_eq!(config.simulation.uplink_interval_secs, 600);

        let device = &config.devices[0];
        assert_eq!(device.lorawan_version, MacVersion::V1_0_2);
        assert_eq!(device.dev_addr, DevAddr(0x2601_1234));
        assert!(device.radio.reject_data_rates.contains(&3));
        assert_eq!(device.radio.snr, -3.5);

        let phy = config.band().unwrap();
        let plan = config.frequency_plan().unwrap();
        let dev = device.end_device(phy, &plan, &config.defaults).unwrap();
        assert_eq!(dev.session.dev_addr, DevAddr(0x2601_1234));
        assert_eq!(dev.mac_state.current_parameters.max_duty_cycle, 1);
        assert_eq!(dev.mac_state.current_parameters.channels.len(), 72);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse("[network]\nband_id = \"EU_863_870\"\n").unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.devices.is_empty());
        assert_eq!(config.frequency_plan().unwrap(), FrequencyPlan::new("EU_863_870"));
        assert_eq!(config.simulation.cycles, 20);
    }

    #[test]
    fn test_rejects_mismatched_band() {
        assert!(Config::parse("[network]\nband_id = \"XX_000\"\n").is_err());
        let err = Config::parse(
            "[network]\nband_id = \"EU_863_870\"\nfrequency_plan = { band_id = \"US_902_928\" }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("US_902_928"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let phy = config.band().unwrap();
        let plan = config.frequency_plan().unwrap();
        for device in &config.devices {
            device.end_device(phy, &plan, &config.defaults).unwrap();
        }
    }
}
