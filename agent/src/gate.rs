use std::{process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::shutdown::{Cancelled, Shutdown};

pub trait Reachability {
    async fn probe(&self, host: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

impl Reachability for PingProbe {
    async fn probe(&self, host: &str) -> bool {
        let status = Command::new("ping")
            .args(["-c", "1", "-W", "1", host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(err) => {
                debug!("failed to spawn ping for {host}: {err}");
                false
            }
        }
    }
}

pub async fn wait_until_reachable<P: Reachability>(
    probe: &P,
    host: &str,
    interval: Duration,
    shutdown: &Shutdown,
) -> Result<(), Cancelled> {
    let mut failures: u64 = 0;

    loop {
        if shutdown.is_requested() {
            return Err(Cancelled);
        }

        if probe.probe(host).await {
            if failures > 0 {
                info!("{host} reachable after {failures} failed probe(s)");
            }
            return Ok(());
        }

        failures = failures.saturating_add(1);
        if failures == 1 {
            warn!("{host} unreachable; waiting for connectivity");
        } else {
            debug!("{host} still unreachable ({failures} probes)");
        }

        shutdown.sleep(interval).await?;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct FlakyProbe {
        failures_left: Cell<u32>,
        calls: Cell<u32>,
    }

    impl FlakyProbe {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: Cell::new(failures),
                calls: Cell::new(0),
            }
        }
    }

    impl Reachability for FlakyProbe {
        async fn probe(&self, _host: &str) -> bool {
            self.calls.set(self.calls.get() + 1);
            match self.failures_left.get() {
                0 => true,
                left => {
                    self.failures_left.set(left - 1);
                    false
                }
            }
        }
    }

    #[tokio::test]
    async fn returns_once_probe_succeeds() {
        let probe = FlakyProbe::new(3);

        let result = wait_until_reachable(
            &probe,
            "8.8.8.8",
            Duration::from_millis(1),
            &Shutdown::never(),
        )
        .await;

        assert_eq!(result, Ok(()));
        assert_eq!(probe.calls.get(), 4);
    }

    #[tokio::test]
    async fn shutdown_cancels_an_unreachable_wait() {
        let probe = FlakyProbe::new(u32::MAX);
        let (tx, shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        let result =
            wait_until_reachable(&probe, "8.8.8.8", Duration::from_millis(5), &shutdown).await;

        assert_eq!(result, Err(Cancelled));
        assert!(probe.calls.get() >= 1);
    }
}
