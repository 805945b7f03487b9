use std::{
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;

pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_MQTT_HOST: &str = "localhost";
pub const DEFAULT_MQTT_PORT: u16 = 8883;
pub const MQTT_TLS_PORT: u16 = 8883;
pub const DEFAULT_DATA_DIR: &str = "./.heater-bridge";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown STORE_BACKEND '{0}' (expected supabase, file or memory)")]
    UnknownBackend(String),
    #[error("STORE_BACKEND=supabase requires {0} to be set")]
    MissingSupabase(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub tls: bool,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub reconnect_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MQTT_HOST.to_string(),
            port: DEFAULT_MQTT_PORT,
            user: None,
            pass: None,
            tls: true,
            client_id: "heater-bridge".to_string(),
            keep_alive_secs: 60,
            reconnect_ms: 1_000,
            publish_timeout_ms: 5_000,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Supabase {
        url: String,
        key: String,
        timeout_ms: u64,
    },
    File {
        dir: PathBuf,
    },
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

/// Which broker variables were present at startup; reported by the health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvPresence {
    pub mqtt_server: bool,
    pub mqtt_port: bool,
    pub mqtt_user: bool,
    pub mqtt_pass: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub http_port: u16,
    pub mqtt: MqttConfig,
    pub store: StoreConfig,
    pub env: EnvPresence,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            mqtt: MqttConfig::default(),
            store: StoreConfig::default(),
            env: EnvPresence::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Unparseable numbers fall back to their defaults; only an unusable
    /// store selection is rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let number = |key: &str| var(key).and_then(|value| value.trim().parse::<u64>().ok());
        let port = |key: &str| var(key).and_then(|value| value.trim().parse::<u16>().ok());

        let env = EnvPresence {
            mqtt_server: var("MQTT_SERVER").is_some(),
            mqtt_port: var("MQTT_PORT").is_some(),
            mqtt_user: var("MQTT_USER").is_some(),
            mqtt_pass: var("MQTT_PASS").is_some(),
        };

        let defaults = MqttConfig::default();
        let mqtt_port = port("MQTT_PORT")
            .filter(|value| *value != 0)
            .unwrap_or(defaults.port);
        let tls = var("MQTT_TLS")
            .and_then(|value| parse_flag(&value))
            .unwrap_or(mqtt_port == MQTT_TLS_PORT);

        let mqtt = MqttConfig {
            host: var("MQTT_SERVER").unwrap_or(defaults.host),
            port: mqtt_port,
            user: var("MQTT_USER"),
            pass: var("MQTT_PASS"),
            tls,
            client_id: var("MQTT_CLIENT_ID").unwrap_or_else(default_client_id),
            keep_alive_secs: number("MQTT_KEEP_ALIVE_SECS").unwrap_or(defaults.keep_alive_secs),
            reconnect_ms: number("MQTT_RECONNECT_MS").unwrap_or(defaults.reconnect_ms),
            publish_timeout_ms: number("MQTT_PUBLISH_TIMEOUT_MS")
                .unwrap_or(defaults.publish_timeout_ms),
        };

        let supabase_url = var("SUPABASE_URL");
        let supabase_key = var("SUPABASE_KEY");
        let backend = var("STORE_BACKEND")
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_else(|| {
                if supabase_url.is_some() {
                    "supabase".to_string()
                } else {
                    "file".to_string()
                }
            });

        let store = match backend.as_str() {
            "supabase" => StoreConfig::Supabase {
                url: supabase_url.ok_or(ConfigError::MissingSupabase("SUPABASE_URL"))?,
                key: supabase_key.ok_or(ConfigError::MissingSupabase("SUPABASE_KEY"))?,
                timeout_ms: number("STORE_TIMEOUT_MS").unwrap_or(10_000),
            },
            "file" => StoreConfig::File {
                dir: var("BRIDGE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            },
            "memory" => StoreConfig::Memory,
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        Ok(Self {
            http_port: port("PORT").unwrap_or(DEFAULT_HTTP_PORT),
            mqtt,
            store,
            env,
        })
    }
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_client_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("heater-bridge-{millis}")
}
