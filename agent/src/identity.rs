use std::{io::ErrorKind, path::Path};

use thermo_common::{parse_mac, DeviceTable, IdentityError, ResolvedDevice};
use tracing::{debug, info, warn};

pub async fn resolve(
    table: &DeviceTable,
    sysfs_net_dir: &Path,
    interfaces: &[String],
) -> Result<ResolvedDevice, IdentityError> {
    for iface in interfaces {
        let path = sysfs_net_dir.join(iface).join("address");
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("interface {iface} not present");
                continue;
            }
            Err(err) => {
                warn!("failed to read {}: {err}", path.display());
                continue;
            }
        };

        let Some(mac) = parse_mac(&raw) else {
            warn!("interface {iface} reports malformed address `{}`", raw.trim());
            continue;
        };

        match table.lookup(&mac) {
            Some(device) => {
                info!(
                    "identified {} on {iface} ({mac}, {})",
                    device.device_id, device.location
                );
                return Ok(device);
            }
            None => warn!("interface {iface} address {mac} is not in the device table"),
        }
    }

    Err(IdentityError::NotFound {
        tried: interfaces.to_vec(),
    })
}
