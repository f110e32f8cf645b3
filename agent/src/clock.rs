use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thermo_common::AgentConfig;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::{
    gate::{wait_until_reachable, Reachability},
    shutdown::{Cancelled, Shutdown},
};

const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
// Seconds between 1900-01-01 and 1970-01-01.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
// LI=0, VN=3, Mode=3 (client)
const NTP_CLIENT_HEADER: u8 = 0x1B;

const NTP_LABEL_FORMAT: &str = "%Y:%m:%d:%H:%M:%S";
const SYSTEM_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub enum TimeSource {
    System {
        tz: Tz,
    },
    Ntp {
        server: String,
        port: u16,
        tz: Tz,
        timeout: Duration,
        retry_interval: Duration,
    },
}

impl TimeSource {
    pub fn from_config(config: &AgentConfig) -> anyhow::Result<Self> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|err| anyhow!("invalid timezone `{}`: {err}", config.timezone))?;

        Ok(match config.network.ntp_server.as_deref() {
            Some(server) => Self::Ntp {
                server: server.to_string(),
                port: NTP_PORT,
                tz,
                timeout: Duration::from_millis(config.network.ntp_timeout_ms),
                retry_interval: Duration::from_millis(config.timing.probe_interval_ms),
            },
            None => Self::System { tz },
        })
    }

    pub fn needs_network(&self) -> bool {
        matches!(self, Self::Ntp { .. })
    }

    pub async fn current_label<P: Reachability>(
        &self,
        probe: &P,
        shutdown: &Shutdown,
    ) -> Result<String, Cancelled> {
        match self {
            Self::System { tz } => Ok(format_label(Utc::now(), tz, SYSTEM_LABEL_FORMAT)),
            Self::Ntp {
                server,
                port,
                tz,
                timeout,
                retry_interval,
            } => {
                wait_until_reachable(probe, server, *retry_interval, shutdown).await?;
                let now = query_until_answered(server, *port, *timeout, *retry_interval, shutdown)
                    .await?;
                Ok(format_label(now, tz, NTP_LABEL_FORMAT))
            }
        }
    }
}

fn format_label(now: DateTime<Utc>, tz: &Tz, format: &str) -> String {
    now.with_timezone(tz).format(format).to_string()
}

async fn query_until_answered(
    server: &str,
    port: u16,
    timeout: Duration,
    retry_interval: Duration,
    shutdown: &Shutdown,
) -> Result<DateTime<Utc>, Cancelled> {
    let mut attempt: u64 = 0;
    loop {
        if shutdown.is_requested() {
            return Err(Cancelled);
        }

        attempt = attempt.saturating_add(1);
        match sntp_query(server, port, timeout).await {
            Ok(now) => return Ok(now),
            Err(err) if attempt == 1 => warn!("ntp query to {server} failed: {err:#}"),
            Err(err) => debug!("ntp query to {server} failed (attempt {attempt}): {err:#}"),
        }

        shutdown.sleep(retry_interval).await?;
    }
}

pub async fn sntp_query(server: &str, port: u16, timeout: Duration) -> anyhow::Result<DateTime<Utc>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind udp socket")?;
    socket
        .connect((server, port))
        .await
        .with_context(|| format!("failed to resolve {server}:{port}"))?;

    let mut request = [0_u8; NTP_PACKET_LEN];
    request[0] = NTP_CLIENT_HEADER;
    socket.send(&request).await.context("failed to send ntp request")?;

    let mut response = [0_u8; NTP_PACKET_LEN];
    let len = tokio::time::timeout(timeout, socket.recv(&mut response))
        .await
        .map_err(|_| anyhow!("no reply within {timeout:?}"))?
        .context("failed to receive ntp reply")?;
    if len < NTP_PACKET_LEN {
        bail!("short ntp reply ({len} bytes)");
    }

    parse_transmit_timestamp(&response).ok_or_else(|| anyhow!("ntp reply carries no usable time"))
}

pub fn parse_transmit_timestamp(packet: &[u8]) -> Option<DateTime<Utc>> {
    if packet.len() < NTP_PACKET_LEN {
        return None;
    }

    // Stratum 0 is a kiss-o'-death reply.
    if packet[1] == 0 {
        return None;
    }

    let secs = u64::from(u32::from_be_bytes(packet[40..44].try_into().ok()?));
    let frac = u64::from(u32::from_be_bytes(packet[44..48].try_into().ok()?));
    let unix_secs = secs.checked_sub(NTP_UNIX_OFFSET)?;
    let nanos = (frac * 1_000_000_000) >> 32;

    DateTime::from_timestamp(i64::try_from(unix_secs).ok()?, u32::try_from(nanos).ok()?)
}
