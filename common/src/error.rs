use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no candidate interface carries a known hardware address (tried {tried:?})")]
    NotFound { tried: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hardware address `{address}` in device table for {location}")]
    InvalidAddress { location: String, address: String },
    #[error("unknown restart mode `{0}` (expected `exec` or `supervised`)")]
    RestartMode(String),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("update host returned HTTP {0}")]
    Status(u16),
    #[error("update request failed: {0}")]
    Request(String),
    #[error("artifact body is empty")]
    EmptyArtifact,
    #[error("sha256 mismatch (expected {expected}, got {actual})")]
    Checksum { expected: String, actual: String },
    #[error("failed to install artifact at {path}: {source}")]
    Install {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to restart: {0}")]
    Restart(#[source] std::io::Error),
}
