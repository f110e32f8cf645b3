use std::{collections::BTreeMap, str::FromStr};

use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "tid")]
    pub device_id: String,
    #[serde(default)]
    pub correction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDevice {
    pub location: String,
    pub mac: MacAddr6,
    pub device_id: String,
    pub correction: f64,
}

pub type RawDeviceTable = BTreeMap<String, BTreeMap<String, DeviceEntry>>;

const BUILTIN: &[(&str, &[(&str, &str, f64)])] = &[
    (
        "Wolfhagen",
        &[
            ("b8:27:aa:aa:aa:aa", "Thermometer_ATW_1", 0.0),
            ("b8:27:bb:bb:bb:bb", "Thermometer_ATW_2", 0.0),
        ],
    ),
    (
        "Ostrow Mazowiecka",
        &[("b8:27:cc:cc:cc:cc", "Thermometer_SP_1", 0.0)],
    ),
    (
        "Biala Podlaska",
        &[("b8:27:eb:13:27:63", "Thermometer_ATP_6", -1.5)],
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTable {
    locations: BTreeMap<String, BTreeMap<MacAddr6, DeviceEntry>>,
}

impl DeviceTable {
    pub fn builtin() -> Self {
        let locations = BUILTIN
            .iter()
            .map(|(location, devices)| {
                let devices = devices
                    .iter()
                    .filter_map(|(mac, device_id, correction)| {
                        let mac = MacAddr6::from_str(mac).ok()?;
                        Some((
                            mac,
                            DeviceEntry {
                                device_id: (*device_id).to_string(),
                                correction: *correction,
                            },
                        ))
                    })
                    .collect();
                ((*location).to_string(), devices)
            })
            .collect();

        Self { locations }
    }

    pub fn from_raw(raw: RawDeviceTable) -> Result<Self, ConfigError> {
        let mut locations = BTreeMap::new();
        for (location, devices) in raw {
            let mut parsed = BTreeMap::new();
            for (address, entry) in devices {
                let mac = parse_mac(&address).ok_or_else(|| ConfigError::InvalidAddress {
                    location: location.clone(),
                    address: address.clone(),
                })?;
                parsed.insert(mac, entry);
            }
            locations.insert(location, parsed);
        }
        Ok(Self { locations })
    }

    pub fn lookup(&self, mac: &MacAddr6) -> Option<ResolvedDevice> {
        self.locations.iter().find_map(|(location, devices)| {
            devices.get(mac).map(|entry| ResolvedDevice {
                location: location.clone(),
                mac: *mac,
                device_id: entry.device_id.clone(),
                correction: entry.correction,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.locations.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn parse_mac(raw: &str) -> Option<MacAddr6> {
    MacAddr6::from_str(&raw.trim().to_ascii_lowercase()).ok()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn builtin_table_resolves_biala_podlaska() {
        let table = DeviceTable::builtin();
        let mac = parse_mac("b8:27:eb:13:27:63").unwrap();

        let device = table.lookup(&mac).unwrap();

        assert_eq!(
            device,
            ResolvedDevice {
                location: "Biala Podlaska".to_string(),
                mac,
                device_id: "Thermometer_ATP_6".to_string(),
                correction: -1.5,
            }
        );
    }

    #[test]
    fn unknown_address_is_not_found() {
        let table = DeviceTable::builtin();
        let mac = parse_mac("00:11:22:33:44:55").unwrap();
        assert!(table.lookup(&mac).is_none());
    }

    #[test]
    fn parse_mac_normalizes_case_and_whitespace() {
        assert_eq!(
            parse_mac("  B8:27:EB:13:27:63\n"),
            parse_mac("b8:27:eb:13:27:63")
        );
        assert!(parse_mac("not-a-mac").is_none());
    }

    #[test]
    fn builtin_table_has_all_devices() {
        assert_eq!(DeviceTable::builtin().len(), 4);
    }

    #[test]
    fn raw_table_round_trips_from_json() {
        let raw: RawDeviceTable = serde_json::from_str(
            r#"{"Lab": {"AA:BB:CC:DD:EE:FF": {"tid": "Thermometer_LAB_1", "correction": 0.4}}}"#,
        )
        .unwrap();
        let table = DeviceTable::from_raw(raw).unwrap();

        let device = table.lookup(&parse_mac("aa:bb:cc:dd:ee:ff").unwrap()).unwrap();
        assert_eq!(device.location, "Lab");
        assert_eq!(device.device_id, "Thermometer_LAB_1");
        assert_eq!(device.correction, 0.4);
    }

    #[test]
    fn raw_table_rejects_bad_address() {
        let raw: RawDeviceTable =
            serde_json::from_str(r#"{"Lab": {"zz": {"tid": "x"}}}"#).unwrap();
        assert!(matches!(
            DeviceTable::from_raw(raw),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }
}
