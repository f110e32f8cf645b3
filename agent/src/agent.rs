use std::time::Duration;

use thermo_common::{config::LoopConfig, ResolvedDevice};
use tracing::{error, info, warn};

use crate::{
    clock::TimeSource,
    gate::{wait_until_reachable, Reachability},
    reporter::Report,
    sensor::Thermometer,
    shutdown::{Cancelled, Shutdown},
};

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub probe_interval: Duration,
}

impl From<&LoopConfig> for Timing {
    fn from(config: &LoopConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            probe_interval: Duration::from_millis(config.probe_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Sent(f64),
    SendFailed(f64),
    ReadFailed,
}

pub struct Agent<T, R, P> {
    device: ResolvedDevice,
    thermometer: T,
    reporter: R,
    clock: TimeSource,
    probe: P,
    connectivity_host: String,
    timing: Timing,
}

impl<T: Thermometer, R: Report, P: Reachability> Agent<T, R, P> {
    pub fn new(
        device: ResolvedDevice,
        thermometer: T,
        reporter: R,
        clock: TimeSource,
        probe: P,
        connectivity_host: String,
        timing: Timing,
    ) -> Self {
        Self {
            device,
            thermometer,
            reporter,
            clock,
            probe,
            connectivity_host,
            timing,
        }
    }

    pub async fn tick(&mut self, shutdown: &Shutdown) -> anyhow::Result<TickOutcome> {
        if self.clock.needs_network() {
            wait_until_reachable(
                &self.probe,
                &self.connectivity_host,
                self.timing.probe_interval,
                shutdown,
            )
            .await?;
        }
        let now = self.clock.current_label(&self.probe, shutdown).await?;

        let Some(temperature) = self
            .thermometer
            .read_corrected(self.device.correction)
            .await?
        else {
            warn!("[{now}] sensor read failed");
            return Ok(TickOutcome::ReadFailed);
        };

        info!("[{now}] temperature: {temperature} °C");
        if self
            .reporter
            .report(&self.device.device_id, temperature)
            .await
        {
            info!("sent");
            Ok(TickOutcome::Sent(temperature))
        } else {
            warn!("send failed");
            Ok(TickOutcome::SendFailed(temperature))
        }
    }

    pub async fn run(&mut self, shutdown: &Shutdown) {
        info!(
            "measuring for {} ({}), correction {:+.1}",
            self.device.device_id, self.device.location, self.device.correction
        );

        loop {
            if shutdown.is_requested() {
                break;
            }

            let pause = match self.tick(shutdown).await {
                Ok(_) => self.timing.poll_interval,
                Err(err) if err.is::<Cancelled>() => break,
                Err(err) => {
                    error!("iteration failed: {err:#}");
                    self.timing.error_backoff
                }
            };

            if shutdown.sleep(pause).await.is_err() {
                break;
            }
        }

        info!("measurement loop stopped");
    }
}
