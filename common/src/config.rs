use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    devices::{DeviceTable, RawDeviceTable},
    error::ConfigError,
};

pub const DEFAULT_COLLECTOR_URL: &str = "http://172.20.10.14:8081/Thermo/Thermo";

pub const SUPERVISED_RESTART_EXIT_CODE: i32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    Exec,
    Supervised,
}

impl RestartMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::Supervised => "supervised",
        }
    }
}

impl FromStr for RestartMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exec" => Ok(Self::Exec),
            "supervised" => Ok(Self::Supervised),
            _ => Err(ConfigError::RestartMode(value.to_string())),
        }
    }
}

impl fmt::Display for RestartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub connectivity_host: String,
    pub collector_url: String,
    // Empty disables self-update.
    pub update_url: String,
    pub ntp_server: Option<String>,
    pub report_timeout_ms: u64,
    pub update_timeout_ms: u64,
    pub ntp_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connectivity_host: "8.8.8.8".to_string(),
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            update_url: String::new(),
            ntp_server: None,
            report_timeout_ms: 5_000,
            update_timeout_ms: 10_000,
            ntp_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub i2c_bus: String,
    pub i2c_address: u8,
    pub i2c_register: u8,
    pub w1_devices_dir: String,
    pub w1_family_prefix: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".to_string(),
            i2c_address: crate::reading::MCP9808_ADDRESS,
            i2c_register: crate::reading::MCP9808_TEMP_REGISTER,
            w1_devices_dir: "/sys/bus/w1/devices".to_string(),
            w1_family_prefix: crate::reading::DS18B20_FAMILY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub sysfs_net_dir: String,
    pub interfaces: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            sysfs_net_dir: "/sys/class/net".to_string(),
            interfaces: vec!["wlan0".to_string(), "eth0".to_string(), "usb0".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub probe_interval_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            error_backoff_ms: 5_000,
            probe_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub network: NetworkConfig,
    pub sensor: SensorConfig,
    pub identity: IdentityConfig,
    #[serde(rename = "loop")]
    pub timing: LoopConfig,
    pub timezone: String,
    pub restart_mode: RestartMode,
    pub devices: Option<RawDeviceTable>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            sensor: SensorConfig::default(),
            identity: IdentityConfig::default(),
            timing: LoopConfig::default(),
            timezone: "Europe/Warsaw".to_string(),
            restart_mode: RestartMode::Exec,
            devices: None,
        }
    }
}

impl AgentConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn device_table(&self) -> Result<DeviceTable, ConfigError> {
        match &self.devices {
            Some(raw) => DeviceTable::from_raw(raw.clone()),
            None => Ok(DeviceTable::builtin()),
        }
    }

    pub fn sanitize(&mut self) {
        self.timing.poll_interval_ms = self.timing.poll_interval_ms.clamp(100, 3_600_000);
        self.timing.error_backoff_ms = self.timing.error_backoff_ms.clamp(100, 3_600_000);
        self.timing.probe_interval_ms = self.timing.probe_interval_ms.clamp(100, 60_000);

        self.network.report_timeout_ms = self.network.report_timeout_ms.clamp(100, 60_000);
        self.network.update_timeout_ms = self.network.update_timeout_ms.clamp(100, 300_000);
        self.network.ntp_timeout_ms = self.network.ntp_timeout_ms.clamp(100, 60_000);

        if self.network.connectivity_host.trim().is_empty() {
            self.network.connectivity_host = NetworkConfig::default().connectivity_host;
        }
        if self
            .network
            .ntp_server
            .as_deref()
            .is_some_and(|server| server.trim().is_empty())
        {
            self.network.ntp_server = None;
        }
        if self.identity.interfaces.is_empty() {
            self.identity.interfaces = IdentityConfig::default().interfaces;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            AgentConfig::from_json(br#"{"network": {"connectivity_host": "1.1.1.1",
                "ntp_server": "pool.ntp.org"}, "restart_mode": "supervised"}"#)
            .unwrap();

        assert_eq!(config.network.connectivity_host, "1.1.1.1");
        assert_eq!(config.network.ntp_server.as_deref(), Some("pool.ntp.org"));
        assert_eq!(config.restart_mode, RestartMode::Supervised);
        assert_eq!(config.network.collector_url, DEFAULT_COLLECTOR_URL);
        assert_eq!(config.network.update_url, "");
        assert_eq!(config.timing.poll_interval_ms, 1_000);
        assert_eq!(config.sensor.i2c_address, 0x18);
        assert_eq!(config.identity.interfaces, vec!["wlan0", "eth0", "usb0"]);
    }

    #[test]
    fn sanitize_clamps_intervals_and_blanks() {
        let mut config = AgentConfig::default();
        config.timing.poll_interval_ms = 0;
        config.network.report_timeout_ms = 10_000_000;
        config.network.ntp_server = Some("  ".to_string());
        config.identity.interfaces.clear();

        config.sanitize();

        assert_eq!(config.timing.poll_interval_ms, 100);
        assert_eq!(config.network.report_timeout_ms, 60_000);
        assert_eq!(config.network.ntp_server, None);
        assert_eq!(config.identity.interfaces.len(), 3);
    }

    #[test]
    fn restart_mode_parses_case_insensitively() {
        assert_eq!("EXEC".parse::<RestartMode>().unwrap(), RestartMode::Exec);
        assert_eq!(
            " supervised ".parse::<RestartMode>().unwrap(),
            RestartMode::Supervised
        );
        assert!("reboot".parse::<RestartMode>().is_err());
    }

    #[test]
    fn custom_device_table_overrides_builtin() {
        let config = AgentConfig::from_json(
            br#"{"devices": {"Lab": {"02:00:00:00:00:01": {"tid": "Thermometer_LAB_1"}}}}"#,
        )
        .unwrap();

        let table = config.device_table().unwrap();
        assert_eq!(table.len(), 1);
    }
}
