pub mod config;
pub mod parser;
pub mod records;
pub mod topics;
pub mod types;

pub use config::{BridgeConfig, ConfigError, EnvPresence, MqttConfig, StoreConfig};
pub use parser::{parse_status, StatusReport};
pub use records::{HeaterStatus, OperationHistory, Record, TemperatureReading, TemperatureSetting};
pub use topics::*;
pub use types::{resolve_owner, EntityKind, HeaterMode, DEVICE_OWNER_ID};
