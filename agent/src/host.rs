use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use thermo_common::{
    config::IdentityConfig, AgentConfig, DeviceTable, ResolvedDevice, RestartMode,
};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::watch,
};
use tracing::{error, info, warn};

use crate::{
    agent::{Agent, Timing},
    clock::TimeSource,
    gate::{wait_until_reachable, PingProbe, Reachability},
    identity,
    reporter::HttpReporter,
    sensor::HostThermometer,
    shutdown::Shutdown,
    update::{ProcessRestart, Restart, Updater},
};

const DEFAULT_CONFIG_PATH: &str = "/etc/thermo-agent/config.json";

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config().await?;
    let clock = TimeSource::from_config(&config)?;
    let table = config.device_table().context("invalid device table")?;

    let (shutdown_tx, shutdown) = Shutdown::channel();
    spawn_signal_listener(shutdown_tx);

    let probe = PingProbe;
    let timing = Timing::from(&config.timing);
    let connectivity_host = config.network.connectivity_host.clone();

    let install_path = std::env::current_exe().context("failed to locate installed executable")?;
    let updater = Updater::new(
        config.network.update_url.clone(),
        env!("CARGO_PKG_VERSION"),
        install_path.clone(),
        Duration::from_millis(config.network.update_timeout_ms),
        ProcessRestart::new(config.restart_mode, install_path),
    )?;

    let Some(device) = start_up(
        &probe,
        &connectivity_host,
        timing.probe_interval,
        &updater,
        &table,
        &config.identity,
        &shutdown,
    )
    .await?
    else {
        return Ok(());
    };

    let reporter = HttpReporter::new(
        config.network.collector_url.clone(),
        Duration::from_millis(config.network.report_timeout_ms),
    )?;

    let mut agent = Agent::new(
        device,
        HostThermometer::new(config.sensor.clone()),
        reporter,
        clock,
        probe,
        connectivity_host,
        timing,
    );
    agent.run(&shutdown).await;
    Ok(())
}

// Gate, self-update, identify. `Ok(None)` means shutdown arrived first.
async fn start_up<P: Reachability, R: Restart>(
    probe: &P,
    connectivity_host: &str,
    probe_interval: Duration,
    updater: &Updater<R>,
    table: &DeviceTable,
    identity_config: &IdentityConfig,
    shutdown: &Shutdown,
) -> anyhow::Result<Option<ResolvedDevice>> {
    if wait_until_reachable(probe, connectivity_host, probe_interval, shutdown)
        .await
        .is_err()
    {
        return Ok(None);
    }
    info!("{connectivity_host} reachable");

    updater.maybe_update().await;

    match identity::resolve(
        table,
        Path::new(&identity_config.sysfs_net_dir),
        &identity_config.interfaces,
    )
    .await
    {
        Ok(device) => Ok(Some(device)),
        Err(err) => {
            error!("critical: device not recognised: {err}");
            Err(err.into())
        }
    }
}

fn spawn_signal_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    warn!("failed to install SIGTERM handler: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!("failed to listen for ctrl-c: {err}");
                    return;
                }
            }
            _ = terminate => {}
        }

        info!("shutdown signal received");
        let _ = tx.send(true);
    });
}

async fn load_config() -> anyhow::Result<AgentConfig> {
    let path = std::env::var("THERMO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = match tokio::fs::read(&path).await {
        Ok(raw) => AgentConfig::from_json(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}; using defaults", path.display());
            AgentConfig::default()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.sanitize();
    Ok(config)
}

fn apply_env_overrides(
    config: &mut AgentConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(url) = lookup("THERMO_COLLECTOR_URL") {
        config.network.collector_url = url;
    }
    if let Some(url) = lookup("THERMO_UPDATE_URL") {
        config.network.update_url = url;
    }
    if let Some(host) = lookup("THERMO_CONNECTIVITY_HOST") {
        config.network.connectivity_host = host;
    }
    if let Some(server) = lookup("THERMO_NTP_SERVER") {
        config.network.ntp_server = Some(server);
    }
    if let Some(timezone) = lookup("THERMO_TIMEZONE") {
        config.timezone = timezone;
    }
    if let Some(mode) = lookup("THERMO_RESTART_MODE") {
        config.restart_mode = mode
            .parse::<RestartMode>()
            .context("invalid THERMO_RESTART_MODE")?;
    }
    Ok(())
}
