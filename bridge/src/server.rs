use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use heater_common::{
    resolve_owner, BridgeConfig, EnvPresence, HeaterStatus, OperationHistory, Record,
    StoreConfig, TemperatureReading, TemperatureSetting,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::{
    mqtt::MqttBridge,
    store::{self, insert_record, RecordStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub bridge: MqttBridge,
    pub env: EnvPresence,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    message: &'static str,
    command: String,
}

/// Entity columns plus an optional owner tag.
#[derive(Debug, Deserialize)]
struct TaggedRecord<R> {
    #[serde(flatten)]
    record: R,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    api: &'static str,
    mqtt_connected: bool,
    mqtt_reconnecting: bool,
    env_vars: EnvVarsView,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EnvVarsView {
    mqtt_server: &'static str,
    mqtt_port: &'static str,
    mqtt_user: &'static str,
    mqtt_pass: &'static str,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    info!(
        "mqtt config: host={} port={} tls={} user={} password={}",
        config.mqtt.host,
        config.mqtt.port,
        config.mqtt.tls,
        config.mqtt.user.as_deref().unwrap_or("NOT SET"),
        if config.mqtt.pass.is_some() { "[HIDDEN]" } else { "NOT SET" },
    );
    match &config.store {
        StoreConfig::Supabase { url, .. } => info!("storing records in supabase at {url}"),
        StoreConfig::File { dir } => info!("storing records under {}", dir.display()),
        StoreConfig::Memory => warn!("storing records in memory; they will not survive a restart"),
    }

    let store = store::open(&config.store).context("failed to open record store")?;
    let bridge = MqttBridge::start(&config.mqtt, store.clone());

    let app = router(AppState {
        store,
        bridge,
        env: config.env,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind api server at {addr}"))?;

    info!("API listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/send-command", post(handle_send_command))
        .route(
            "/api/temperature-setting",
            get(handle_get_latest::<TemperatureSetting>)
                .post(handle_post_tagged::<TemperatureSetting>),
        )
        .route(
            "/api/sensor-data",
            get(handle_get_latest::<TemperatureReading>)
                .post(handle_post_tagged::<TemperatureReading>),
        )
        .route(
            "/api/heater-status",
            get(handle_get_latest::<HeaterStatus>).post(handle_post_tagged::<HeaterStatus>),
        )
        .route(
            "/api/riwayat",
            get(handle_get_latest::<OperationHistory>)
                .post(handle_post_tagged::<OperationHistory>),
        )
        .route(
            "/api/iot/sensor-data",
            post(handle_post_device::<TemperatureReading>),
        )
        .route(
            "/api/iot/temperature-setting",
            post(handle_post_device::<TemperatureSetting>),
        )
        .route(
            "/api/iot/heater-status",
            post(handle_post_device::<HeaterStatus>),
        )
        .route("/api/iot/riwayat", post(handle_post_device::<OperationHistory>))
        .route("/api/health", get(handle_get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_send_command(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };

    match state.bridge.publish_command(&request.command).await {
        Ok(()) => Json(CommandResponse {
            message: "Command sent to device",
            command: request.command,
        })
        .into_response(),
        Err(err) => {
            warn!("failed to publish command: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

async fn handle_post_tagged<R: Record>(
    State(state): State<AppState>,
    payload: Result<Json<TaggedRecord<R>>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };

    let owner = resolve_owner(body.user_id.as_deref());
    save(&state, &body.record, Some(owner), sentence_case(R::KIND.label())).await
}

/// Device-origin writes carry no owner tag.
async fn handle_post_device<R: Record>(
    State(state): State<AppState>,
    payload: Result<Json<R>, JsonRejection>,
) -> Response {
    let record = match payload {
        Ok(Json(record)) => record,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };

    save(&state, &record, None, format!("IoT {}", R::KIND.label())).await
}

async fn save<R: Record>(
    state: &AppState,
    record: &R,
    owner: Option<&str>,
    subject: String,
) -> Response {
    match insert_record(state.store.as_ref(), record, owner).await {
        Ok(()) => Json(MessageBody {
            message: format!("{subject} saved"),
        })
        .into_response(),
        Err(err) => {
            warn!("failed to store {} record: {err}", R::KIND);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

async fn handle_get_latest<R: Record>(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    let owner = resolve_owner(query.user_id.as_deref());
    match state.store.latest(R::KIND, owner).await {
        Ok(Some(row)) => Json(row).into_response(),
        Ok(None) => Json(json!({})).into_response(),
        Err(err) => {
            warn!("failed to read latest {} record: {err}", R::KIND);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

async fn handle_get_health(State(state): State<AppState>) -> impl IntoResponse {
    let link = state.bridge.status().await;
    Json(HealthResponse {
        api: "running",
        mqtt_connected: link.connected,
        mqtt_reconnecting: link.reconnecting,
        env_vars: EnvVarsView {
            mqtt_server: set_flag(state.env.mqtt_server),
            mqtt_port: set_flag(state.env.mqtt_port),
            mqtt_user: set_flag(state.env.mqtt_user),
            mqtt_pass: set_flag(state.env.mqtt_pass),
        },
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn set_flag(present: bool) -> &'static str {
    if present {
        "SET"
    } else {
        "NOT SET"
    }
}

fn sentence_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
