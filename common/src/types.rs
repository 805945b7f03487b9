use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner tag recorded for rows produced by the physical device.
pub const DEVICE_OWNER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Falls back to [`DEVICE_OWNER_ID`] when no tag (or an empty one) was supplied.
pub fn resolve_owner(requested: Option<&str>) -> &str {
    match requested {
        Some(owner) if !owner.is_empty() => owner,
        _ => DEVICE_OWNER_ID,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaterMode {
    Auto,
    Off,
}

impl HeaterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Off => "off",
        }
    }

    /// Token the device prints in its status line.
    pub fn device_token(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Off => "Off",
        }
    }

    pub fn from_device_token(token: &str) -> Option<Self> {
        match token {
            "Auto" => Some(Self::Auto),
            "Off" => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for HeaterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four append-only tables the bridge writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    SensorData,
    TemperatureSetting,
    HeaterStatus,
    Riwayat,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        Self::SensorData,
        Self::TemperatureSetting,
        Self::HeaterStatus,
        Self::Riwayat,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::SensorData => "sensor_data",
            Self::TemperatureSetting => "temperature_setting",
            Self::HeaterStatus => "heater_status",
            Self::Riwayat => "riwayat",
        }
    }

    /// Lower-case human label, e.g. for API confirmation messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::SensorData => "sensor data",
            Self::TemperatureSetting => "temperature setting",
            Self::HeaterStatus => "heater status",
            Self::Riwayat => "riwayat",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_owner_falls_back_to_device() {
        assert_eq!(resolve_owner(None), DEVICE_OWNER_ID);
        assert_eq!(resolve_owner(Some("")), DEVICE_OWNER_ID);
        assert_eq!(resolve_owner(Some("user-7")), "user-7");
    }

    #[test]
    fn heater_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HeaterMode::Auto).unwrap(), "\"auto\"");
        assert_eq!(
            serde_json::from_str::<HeaterMode>("\"off\"").unwrap(),
            HeaterMode::Off
        );
        assert!(serde_json::from_str::<HeaterMode>("\"Auto\"").is_err());
    }

    #[test]
    fn device_tokens_are_case_sensitive() {
        assert_eq!(HeaterMode::from_device_token("Auto"), Some(HeaterMode::Auto));
        assert_eq!(HeaterMode::from_device_token("auto"), None);
        assert_eq!(HeaterMode::from_device_token("OFF"), None);
    }
}
