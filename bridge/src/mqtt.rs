use std::{fmt, sync::Arc, time::Duration};

use heater_common::{
    parse_status, MqttConfig, DEVICE_OWNER_ID, TOPIC_DEVICE_CONTROL, TOPIC_DEVICE_STATUS,
};
use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, Incoming, MqttOptions, QoS, SubscribeReasonCode,
    Transport,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dispatch::{dispatch, DispatchReport},
    store::RecordStore,
};

const REQUEST_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid mqtt configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("mqtt client unavailable: {0}")]
    Unavailable(String),
    #[error("publish not accepted within {0:?}")]
    PublishTimeout(Duration),
    #[error("publish failed: {0}")]
    Publish(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Offline,
    Reconnecting,
    /// The client could never be built. Terminal.
    Unavailable(String),
}

/// What the event loop observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    PollStarted,
    ConnAck,
    Error(String),
    BrokerDisconnect,
}

impl ConnectionState {
    pub fn next(&self, event: &LinkEvent) -> ConnectionState {
        match (self, event) {
            (Self::Unavailable(reason), _) => Self::Unavailable(reason.clone()),
            (_, LinkEvent::ConnAck) => Self::Connected,
            (_, LinkEvent::Error(_) | LinkEvent::BrokerDisconnect) => Self::Offline,
            (Self::Disconnected, LinkEvent::PollStarted) => Self::Connecting,
            (Self::Offline, LinkEvent::PollStarted) => Self::Reconnecting,
            (state, LinkEvent::PollStarted) => state.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Offline => f.write_str("offline"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// Snapshot for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub connected: bool,
    pub reconnecting: bool,
}

/// Shared handle to the broker connection.
///
/// Clones share one client and one state cell. A bridge whose client could
/// not be built stays in [`ConnectionState::Unavailable`] and rejects every
/// publish.
#[derive(Clone)]
pub struct MqttBridge {
    client: Option<AsyncClient>,
    state: Arc<Mutex<ConnectionState>>,
    publish_timeout: Duration,
}

impl MqttBridge {
    /// Builds the client and spawns its event loop. Never fails: a bad
    /// configuration yields an unavailable bridge.
    pub fn start(config: &MqttConfig, store: Arc<dyn RecordStore>) -> Self {
        match build_options(config) {
            Ok(options) => {
                let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
                let bridge = Self::with_client(client, config.publish_timeout());
                spawn_event_loop(
                    bridge.clone(),
                    eventloop,
                    store,
                    config.reconnect_period(),
                );
                bridge
            }
            Err(err) => {
                warn!("mqtt client could not be created, running without broker: {err}");
                Self::unavailable(err.to_string())
            }
        }
    }

    pub fn with_client(client: AsyncClient, publish_timeout: Duration) -> Self {
        Self {
            client: Some(client),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            publish_timeout,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            client: None,
            state: Arc::new(Mutex::new(ConnectionState::Unavailable(reason.into()))),
            publish_timeout: Duration::ZERO,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    pub async fn status(&self) -> LinkStatus {
        let state = self.state.lock().await;
        LinkStatus {
            connected: state.is_connected(),
            reconnecting: state.is_reconnecting(),
        }
    }

    /// Publishes `command` on the control topic, waiting at most the
    /// configured publish timeout for the client to take it.
    pub async fn publish_command(&self, command: &str) -> Result<(), TransportError> {
        let Some(client) = &self.client else {
            let state = self.state().await;
            return Err(TransportError::Unavailable(state.to_string()));
        };

        let publish = client.publish(
            TOPIC_DEVICE_CONTROL,
            QoS::AtMostOnce,
            false,
            command.as_bytes().to_vec(),
        );
        tokio::time::timeout(self.publish_timeout, publish)
            .await
            .map_err(|_| TransportError::PublishTimeout(self.publish_timeout))??;
        Ok(())
    }

    async fn observe(&self, event: LinkEvent) -> ConnectionState {
        let mut state = self.state.lock().await;
        let next = state.next(&event);
        if next != *state {
            match (&next, &event) {
                (ConnectionState::Connected, _) => info!("connected to mqtt broker"),
                (ConnectionState::Offline, LinkEvent::Error(err)) => {
                    warn!("mqtt connection error: {err}");
                    info!("mqtt client offline");
                }
                (ConnectionState::Offline, _) => info!("mqtt client offline"),
                (ConnectionState::Reconnecting, _) => info!("mqtt client reconnecting..."),
                (other, _) => debug!("mqtt state -> {other}"),
            }
        } else if let LinkEvent::Error(err) = &event {
            warn!("mqtt connection error: {err}");
        }
        *state = next.clone();
        next
    }

    fn subscribe_status(&self) {
        let Some(client) = &self.client else {
            return;
        };
        match client.try_subscribe(TOPIC_DEVICE_STATUS, QoS::AtMostOnce) {
            Ok(()) => debug!("subscription to {TOPIC_DEVICE_STATUS} requested"),
            Err(err) => warn!("mqtt subscribe error on {TOPIC_DEVICE_STATUS}: {err}"),
        }
    }
}

pub fn build_options(config: &MqttConfig) -> Result<MqttOptions, TransportError> {
    if config.host.trim().is_empty() {
        return Err(TransportError::InvalidConfig("broker host is empty"));
    }
    if config.port == 0 {
        return Err(TransportError::InvalidConfig("broker port must be non-zero"));
    }
    if config.client_id.is_empty() || config.client_id.starts_with(' ') {
        return Err(TransportError::InvalidConfig(
            "client id must be non-empty and not start with a space",
        ));
    }
    if config.keep_alive_secs == 0 {
        return Err(TransportError::InvalidConfig("keep-alive must be at least one second"));
    }

    let mut options = MqttOptions::new(config.client_id.clone(), config.host.trim(), config.port);
    options.set_keep_alive(config.keep_alive());
    if let Some(user) = &config.user {
        options.set_credentials(user.clone(), config.pass.clone().unwrap_or_default());
    }
    if config.tls {
        install_crypto_provider();
        options.set_transport(Transport::tls_with_default_config());
    }
    Ok(options)
}

/// ring (reqwest) and aws-lc-rs (rumqttc) are both linked, so rustls needs
/// an explicit process default before any TLS config is built.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

fn spawn_event_loop(
    bridge: MqttBridge,
    mut eventloop: EventLoop,
    store: Arc<dyn RecordStore>,
    reconnect_period: Duration,
) {
    tokio::spawn(async move {
        loop {
            bridge.observe(LinkEvent::PollStarted).await;
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    bridge.observe(LinkEvent::ConnAck).await;
                    bridge.subscribe_status();
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        warn!("mqtt subscribe error: broker refused {TOPIC_DEVICE_STATUS}");
                    } else {
                        info!("subscribed to {TOPIC_DEVICE_STATUS}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    handle_message(store.as_ref(), &message.topic, &message.payload).await;
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    bridge.observe(LinkEvent::BrokerDisconnect).await;
                }
                Ok(_) => {}
                Err(err) => {
                    bridge.observe(LinkEvent::Error(err.to_string())).await;
                    tokio::time::sleep(reconnect_period).await;
                }
            }
        }
    });
}

/// Handles one inbound publish to completion. Anything that is not a
/// readable status line on the status topic is dropped.
pub async fn handle_message(
    store: &dyn RecordStore,
    topic: &str,
    payload: &[u8],
) -> Option<DispatchReport> {
    if topic != TOPIC_DEVICE_STATUS {
        return None;
    }
    let text = String::from_utf8_lossy(payload);
    info!("received from device: {text}");

    let Some(report) = parse_status(&text) else {
        debug!("status payload has no temperature, skipping");
        return None;
    };
    Some(dispatch(store, &report, Some(DEVICE_OWNER_ID)).await)
}
