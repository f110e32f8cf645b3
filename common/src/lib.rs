pub mod config;
pub mod devices;
pub mod error;
pub mod reading;
pub mod version;

pub use config::{AgentConfig, RestartMode};
pub use devices::{parse_mac, DeviceEntry, DeviceTable, ResolvedDevice};
pub use error::{ConfigError, IdentityError, UpdateError};
pub use reading::{apply_correction, decode_mcp9808, parse_w1_slave, round_1dp};
pub use version::{extract_version, UpdateManifest};
