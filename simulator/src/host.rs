use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS, Transport};
use tokio::sync::mpsc;
use tracing::{info, warn};

use heater_common::{config::parse_flag, TOPIC_DEVICE_CONTROL, TOPIC_DEVICE_STATUS};

use crate::device::{Command, DeviceModel};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mqtt_host = std::env::var("MQTT_SERVER").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let tls = std::env::var("MQTT_TLS")
        .ok()
        .and_then(|value| parse_flag(&value))
        .unwrap_or(mqtt_port == 8883);
    let interval_secs = std::env::var("SIM_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(30);

    let mut mqtt_options = MqttOptions::new("heater-simulator", mqtt_host, mqtt_port);
    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }
    if tls {
        mqtt_options.set_transport(Transport::tls_with_default_config());
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);
    let (commands_tx, mut commands_rx) = mpsc::channel::<String>(16);

    let subscriber = mqtt.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("simulator connected");
                    if let Err(err) =
                        subscriber.try_subscribe(TOPIC_DEVICE_CONTROL, QoS::AtMostOnce)
                    {
                        warn!("simulator subscribe error: {err}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message)))
                    if message.topic == TOPIC_DEVICE_CONTROL =>
                {
                    let text = String::from_utf8_lossy(&message.payload).into_owned();
                    if commands_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("simulator mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    info!("device simulator started, reporting every {interval_secs}s");

    let mut device = DeviceModel::default();
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let line = device.step(interval_secs).to_string();
                info!("status: {line}");
                mqtt.publish(TOPIC_DEVICE_STATUS, QoS::AtMostOnce, false, line)
                    .await
                    .context("failed to publish device status")?;
            }
            Some(text) = commands_rx.recv() => {
                match Command::parse(&text) {
                    Some(command) => {
                        info!("applying command {command:?}");
                        device.apply(&command);
                    }
                    None => warn!("ignoring unknown command {text:?}"),
                }
            }
        }
    }
}
