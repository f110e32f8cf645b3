use std::{
    ffi::OsString,
    io::ErrorKind,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use sha2::{Digest, Sha256};
use thermo_common::{
    config::SUPERVISED_RESTART_EXIT_CODE, RestartMode, UpdateError, UpdateManifest,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Disabled,
    NoMarker,
    UpToDate,
    NoArtifact { version: String },
    Installed { version: String },
    Failed,
}

pub trait Restart {
    fn restart(&self) -> Result<(), UpdateError>;
}

pub struct ProcessRestart {
    mode: RestartMode,
    executable: PathBuf,
}

impl ProcessRestart {
    pub fn new(mode: RestartMode, executable: PathBuf) -> Self {
        Self { mode, executable }
    }
}

impl Restart for ProcessRestart {
    fn restart(&self) -> Result<(), UpdateError> {
        match self.mode {
            RestartMode::Exec => {
                let args: Vec<OsString> = std::env::args_os().skip(1).collect();
                info!("re-executing {}", self.executable.display());
                // Only returns on failure.
                let err = std::process::Command::new(&self.executable)
                    .args(args)
                    .exec();
                Err(UpdateError::Restart(err))
            }
            RestartMode::Supervised => {
                info!("exiting with status {SUPERVISED_RESTART_EXIT_CODE} for supervisor restart");
                std::process::exit(SUPERVISED_RESTART_EXIT_CODE)
            }
        }
    }
}

pub struct Updater<R> {
    client: reqwest::Client,
    manifest_url: String,
    current_version: String,
    install_path: PathBuf,
    restarter: R,
}

impl<R: Restart> Updater<R> {
    pub fn new(
        manifest_url: impl Into<String>,
        current_version: impl Into<String>,
        install_path: PathBuf,
        timeout: Duration,
        restarter: R,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build update http client")?;

        Ok(Self {
            client,
            manifest_url: manifest_url.into(),
            current_version: current_version.into(),
            install_path,
            restarter,
        })
    }

    pub async fn maybe_update(&self) -> UpdateOutcome {
        if self.manifest_url.trim().is_empty() {
            info!("self-update disabled");
            return UpdateOutcome::Disabled;
        }

        info!("checking for updates (running {})", self.current_version);
        let outcome = match self.check_and_install().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("update check failed: {err}");
                return UpdateOutcome::Failed;
            }
        };

        match &outcome {
            UpdateOutcome::Installed { version } => {
                info!("installed version {version}; restarting");
                if let Err(err) = self.restarter.restart() {
                    warn!("{err}; continuing on {}", self.current_version);
                }
            }
            UpdateOutcome::NoMarker => warn!("update manifest carries no version marker"),
            UpdateOutcome::UpToDate => info!("version is current"),
            UpdateOutcome::NoArtifact { version } => {
                warn!("manifest announces version {version} but names no artifact; not updating")
            }
            UpdateOutcome::Disabled | UpdateOutcome::Failed => {}
        }
        outcome
    }

    async fn check_and_install(&self) -> Result<UpdateOutcome, UpdateError> {
        let body = self.fetch(&self.manifest_url).await?;
        let manifest = UpdateManifest::parse(&String::from_utf8_lossy(&body));

        let Some(remote) = manifest.version.clone() else {
            return Ok(UpdateOutcome::NoMarker);
        };
        if !manifest.is_newer_than(&self.current_version) {
            return Ok(UpdateOutcome::UpToDate);
        }

        // The manifest body itself is never installed as the executable.
        let Some(url) = manifest.artifact_url.as_deref() else {
            return Ok(UpdateOutcome::NoArtifact { version: remote });
        };

        info!("updating {} -> {remote}", self.current_version);
        let artifact = self.fetch(url).await?;

        verify_artifact(&artifact, manifest.sha256.as_deref())?;
        install_artifact(&self.install_path, &artifact).await?;

        Ok(UpdateOutcome::Installed { version: remote })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| UpdateError::Request(err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpdateError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| UpdateError::Request(err.to_string()))?;
        Ok(body.to_vec())
    }
}

fn verify_artifact(artifact: &[u8], expected_sha256: Option<&str>) -> Result<(), UpdateError> {
    if artifact.is_empty() {
        return Err(UpdateError::EmptyArtifact);
    }

    let Some(expected) = expected_sha256 else {
        return Ok(());
    };

    let actual = sha256_hex(artifact);
    let expected = expected.trim().to_ascii_lowercase();
    if actual != expected {
        return Err(UpdateError::Checksum { expected, actual });
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".update");
    path.with_file_name(name)
}

// Writes next to `path` and renames over it, keeping the original mode bits.
async fn install_artifact(path: &Path, artifact: &[u8]) -> Result<(), UpdateError> {
    let staging = staging_path(path);
    let install_error = |source| UpdateError::Install {
        path: path.display().to_string(),
        source,
    };

    let result = async {
        let permissions = match tokio::fs::metadata(path).await {
            Ok(metadata) => Some(metadata.permissions()),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };

        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(artifact).await?;
        file.sync_all().await?;
        drop(file);

        if let Some(permissions) = permissions {
            tokio::fs::set_permissions(&staging, permissions).await?;
        }
        tokio::fs::rename(&staging, path).await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(install_error(err));
    }
    Ok(())
}
