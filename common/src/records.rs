use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::types::{EntityKind, HeaterMode};

/// A row shape that belongs to exactly one table.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    #[serde(rename = "suhu")]
    pub value: f64,
}

impl Record for TemperatureReading {
    const KIND: EntityKind = EntityKind::SensorData;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSetting {
    #[serde(rename = "suhu_min")]
    pub min: f64,
    #[serde(rename = "suhu_max")]
    pub max: f64,
}

impl Record for TemperatureSetting {
    const KIND: EntityKind = EntityKind::TemperatureSetting;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaterStatus {
    pub status: HeaterMode,
}

impl Record for HeaterStatus {
    const KIND: EntityKind = EntityKind::HeaterStatus;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHistory {
    #[serde(rename = "durasi_heater")]
    pub heater_duration_secs: u64,
    #[serde(rename = "durasi_pompa")]
    pub pump_duration_secs: u64,
}

impl Record for OperationHistory {
    const KIND: EntityKind = EntityKind::Riwayat;
}
