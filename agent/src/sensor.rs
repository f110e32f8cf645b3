use std::path::{Path, PathBuf};

use anyhow::Context;
use embedded_hal::i2c::I2c as _;
use linux_embedded_hal::I2cdev;
use thermo_common::{apply_correction, config::SensorConfig, decode_mcp9808, parse_w1_slave};
use tracing::{debug, info, warn};

pub trait Thermometer {
    // `Ok(None)` means no sensor produced a value this time.
    async fn read_corrected(&mut self, correction: f64) -> anyhow::Result<Option<f64>>;
}

pub struct HostThermometer {
    config: SensorConfig,
}

impl HostThermometer {
    pub fn new(config: SensorConfig) -> Self {
        Self { config }
    }

    async fn read_raw(&self) -> anyhow::Result<Option<f64>> {
        let config = self.config.clone();
        let primary = tokio::task::spawn_blocking(move || read_mcp9808(&config))
            .await
            .context("i2c read task failed")?;

        if let Some(temp_c) = primary {
            debug!("[MCP9808] {temp_c:.4}°C");
            return Ok(Some(temp_c));
        }

        let fallback = read_ds18b20(
            Path::new(&self.config.w1_devices_dir),
            &self.config.w1_family_prefix,
        )
        .await;
        if let Some(temp_c) = fallback {
            debug!("[DS18B20] {temp_c:.3}°C");
        }
        Ok(fallback)
    }
}

impl Thermometer for HostThermometer {
    async fn read_corrected(&mut self, correction: f64) -> anyhow::Result<Option<f64>> {
        Ok(self
            .read_raw()
            .await?
            .map(|raw| apply_correction(raw, correction)))
    }
}

fn read_mcp9808(config: &SensorConfig) -> Option<f64> {
    let mut bus = match I2cdev::new(&config.i2c_bus) {
        Ok(bus) => bus,
        Err(err) => {
            debug!("i2c bus {} unavailable: {err}", config.i2c_bus);
            return None;
        }
    };

    let mut raw = [0_u8; 2];
    match bus.write_read(config.i2c_address, &[config.i2c_register], &mut raw) {
        Ok(()) => Some(decode_mcp9808(raw)),
        Err(err) => {
            debug!(
                "MCP9808 read at {:#04x} on {} failed: {err:?}",
                config.i2c_address, config.i2c_bus
            );
            None
        }
    }
}

async fn read_ds18b20(devices_dir: &Path, family_prefix: &str) -> Option<f64> {
    let Some(device) = first_w1_device(devices_dir, family_prefix).await else {
        debug!("no 1-Wire sensor under {}", devices_dir.display());
        return None;
    };

    let path = device.join("w1_slave");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let parsed = parse_w1_slave(&contents);
            if parsed.is_none() {
                warn!("unexpected contents in {}", path.display());
            }
            parsed
        }
        Err(err) => {
            warn!("failed to read {}: {err}", path.display());
            None
        }
    }
}

async fn first_w1_device(devices_dir: &Path, family_prefix: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(devices_dir).await.ok()?;
    let mut matches = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(family_prefix))
        {
            matches.push(entry.path());
        }
    }

    matches.sort();
    let first = matches.into_iter().next();
    if let Some(device) = first.as_ref() {
        info!("using 1-Wire sensor {}", device.display());
    }
    first
}
