use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use dualzone_common::{
    fan_command_topic, mode_command_topic, CommandError, DualZoneEngine,
    EngineState, FanSpeed, GuardVerdict, Resolution, RuntimeConfig, TickReport, ZoneId,
    TOPIC_CMD_ENABLED, TOPIC_CMD_RESET_LEARNING, TOPIC_CMD_ZONE1_FAN, TOPIC_CMD_ZONE1_TARGET,
    TOPIC_CMD_ZONE2_FAN, TOPIC_CMD_ZONE2_TARGET, TOPIC_TELEMETRY, TOPIC_ZONE1_TEMP,
    TOPIC_ZONE2_TEMP,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<DualZoneEngine>>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    state_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const COMMAND_RETRY_DELAY: Duration = Duration::from_millis(250);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });

    let persisted = store.load_engine_state().await.unwrap_or_else(|err| {
        warn!("failed to load engine state from store: {err:#}");
        None
    });
    let engine = match persisted {
        Some(state) => {
            info!("restored persisted engine state");
            DualZoneEngine::new(runtime.engine.clone(), state)
        }
        None => {
            info!("no persisted engine state, starting from configured defaults");
            DualZoneEngine::from_config(&runtime)
        }
    };
    let update_interval = Duration::from_secs(engine.config.update_interval_secs);

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("dualzone-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone(), update_interval);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/fan", post(handle_set_fan))
        .route("/api/enabled", post(handle_set_enabled))
        .route("/api/learning/reset", post(handle_reset_learning))
        .with_state(app_state.clone());

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final persist so learned rates and the start window survive restarts.
    let state = app_state.engine.lock().await.state().clone();
    if let Err(err) = app_state.store.save_engine_state(&state).await {
        warn!("final engine state persist failed: {err:#}");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_ZONE1_TEMP,
        TOPIC_ZONE2_TEMP,
        TOPIC_CMD_ZONE1_TARGET,
        TOPIC_CMD_ZONE2_TARGET,
        TOPIC_CMD_ZONE1_FAN,
        TOPIC_CMD_ZONE2_FAN,
        TOPIC_CMD_ENABLED,
        TOPIC_CMD_RESET_LEARNING,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState, update_interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(update_interval);

        loop {
            interval.tick().await;
            let now = Utc::now();

            let (report, telemetry) = {
                let mut engine = app_state.engine.lock().await;
                let report = engine.tick(now);
                (report, engine.telemetry(now))
            };

            log_report(&report);
            apply_zone_commands(&app_state.mqtt, &report).await;

            match serde_json::to_vec(&telemetry) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_TELEMETRY, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("telemetry publish failed: {err}");
                    }
                }
                Err(err) => warn!("telemetry serialization failed: {err}"),
            }

            // Best-effort: a failed save is retried on the next tick.
            let state = app_state.engine.lock().await.state().clone();
            if let Err(err) = app_state.store.save_engine_state(&state).await {
                warn!("engine state persist failed, retrying next tick: {err:#}");
            }
        }
    });
}

fn log_report(report: &TickReport) {
    for zone in &report.stale_zones {
        warn!(
            "{}: no fresh temperature reading, holding last known state this tick",
            zone.as_str()
        );
    }

    if let Resolution::Conflict { lead, passive } = report.resolution {
        info!(
            "mode conflict: {} leads, {} idles on fan only",
            lead.as_str(),
            passive.as_str()
        );
    }

    if let Some(comp) = report.compensation {
        info!(
            "leakage compensation: {} comparison target shifted {:+.2}°F (predicted drift {:.2}°F)",
            comp.zone.as_str(),
            comp.offset_f,
            comp.predicted_drift_f
        );
    }

    match report.guard {
        GuardVerdict::Started => warn!("compressor start"),
        GuardVerdict::Stopped => info!("compressor stop"),
        GuardVerdict::HeldOff { remaining_secs } => warn!(
            "minimum off-time hold: compressor start deferred for {remaining_secs}s, zones on fan only"
        ),
        GuardVerdict::HeldOn { remaining_secs } => warn!(
            "minimum runtime hold: compressor stop deferred for {remaining_secs}s, previous modes retained"
        ),
        GuardVerdict::Unchanged => {}
    }

    debug!(
        "tick: zone1 {}/{}, zone2 {}/{}, deadband {:.1}°F",
        report.modes.zone1.as_str(),
        report.fans.zone1.as_str(),
        report.modes.zone2.as_str(),
        report.fans.zone2.as_str(),
        report.deadband_f
    );
}

async fn apply_zone_commands(mqtt: &AsyncClient, report: &TickReport) {
    for command in &report.commands {
        if let Some(mode) = command.mode {
            info!("{}: mode -> {}", command.zone.as_str(), mode.as_str());
            publish_with_retry(mqtt, mode_command_topic(command.zone), mode.as_str()).await;
        }
        if let Some(fan) = command.fan {
            info!("{}: fan -> {}", command.zone.as_str(), fan.as_str());
            publish_with_retry(mqtt, fan_command_topic(command.zone), fan.as_str()).await;
        }
    }
}

async fn publish_with_retry(mqtt: &AsyncClient, topic: &str, payload: &str) {
    for attempt in 0..2 {
        match mqtt
            .publish(topic, QoS::AtLeastOnce, false, payload.to_owned())
            .await
        {
            Ok(()) => return,
            Err(err) if attempt == 0 => {
                warn!("command publish failed on {topic}, retrying once: {err}");
                tokio::time::sleep(COMMAND_RETRY_DELAY).await;
            }
            Err(err) => {
                warn!("command mismatch: {topic} could not be applied: {err}");
            }
        }
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let now = Utc::now();

    match topic.as_str() {
        TOPIC_ZONE1_TEMP | TOPIC_ZONE2_TEMP => {
            let zone = if topic == TOPIC_ZONE1_TEMP {
                ZoneId::Zone1
            } else {
                ZoneId::Zone2
            };
            match message.trim().parse::<f32>() {
                Ok(temp_f) => {
                    let mut engine = app_state.engine.lock().await;
                    if let Err(err) = engine.update_temperature(zone, temp_f, now) {
                        warn!("rejected temperature for {}: {err}", zone.as_str());
                    }
                }
                Err(_) => warn!("unparseable temperature payload on {topic}: {message:?}"),
            }
        }
        TOPIC_CMD_ZONE1_TARGET | TOPIC_CMD_ZONE2_TARGET => {
            let zone = if topic == TOPIC_CMD_ZONE1_TARGET {
                ZoneId::Zone1
            } else {
                ZoneId::Zone2
            };
            let Ok(target_f) = message.trim().parse::<f32>() else {
                warn!("unparseable target payload on {topic}: {message:?}");
                return Ok(());
            };
            let result = {
                let mut engine = app_state.engine.lock().await;
                engine.set_target(zone, target_f)
            };
            match result {
                Ok(true) => persist_engine_state(app_state).await,
                Ok(false) => {}
                Err(err) => warn!("rejected target for {}: {err}", zone.as_str()),
            }
        }
        TOPIC_CMD_ZONE1_FAN | TOPIC_CMD_ZONE2_FAN => {
            let zone = if topic == TOPIC_CMD_ZONE1_FAN {
                ZoneId::Zone1
            } else {
                ZoneId::Zone2
            };
            let Some(speed) = FanSpeed::parse(message.trim()) else {
                warn!(
                    "{}",
                    CommandError::UnknownFanSpeed(message.trim().to_string())
                );
                return Ok(());
            };
            let changed = {
                let mut engine = app_state.engine.lock().await;
                engine.set_nominal_fan(zone, speed)
            };
            if changed {
                persist_engine_state(app_state).await;
            }
        }
        TOPIC_CMD_ENABLED => {
            let enabled = match message.trim() {
                "true" | "on" => true,
                "false" | "off" => false,
                other => {
                    warn!("{}", CommandError::UnknownEnabledValue(other.to_string()));
                    return Ok(());
                }
            };
            let changed = {
                let mut engine = app_state.engine.lock().await;
                engine.set_enabled(enabled)
            };
            if changed {
                info!("controller {}", if enabled { "enabled" } else { "disabled" });
                persist_engine_state(app_state).await;
            }
        }
        TOPIC_CMD_RESET_LEARNING => {
            {
                let mut engine = app_state.engine.lock().await;
                engine.reset_learning();
            }
            info!("all learned rates reset");
            persist_engine_state(app_state).await;
        }
        _ => {}
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    Json(engine.telemetry(Utc::now()))
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let zone = match parse_zone_param(&params) {
        Ok(zone) => zone,
        Err(response) => return response,
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target_f) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        match engine.set_target(zone, target_f) {
            Ok(changed) => changed,
            Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        }
    };

    if changed {
        persist_engine_state(&state).await;
    }
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_fan(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let zone = match parse_zone_param(&params) {
        Ok(zone) => zone,
        Err(response) => return response,
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(speed) = FanSpeed::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &CommandError::UnknownFanSpeed(value.clone()).to_string(),
        );
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        engine.set_nominal_fan(zone, speed)
    };

    if changed {
        persist_engine_state(&state).await;
    }
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_enabled(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let enabled = match value.as_str() {
        "true" | "on" => true,
        "false" | "off" => false,
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &CommandError::UnknownEnabledValue(other.to_string()).to_string(),
            )
        }
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        engine.set_enabled(enabled)
    };
    if changed {
        info!("controller {}", if enabled { "enabled" } else { "disabled" });
        persist_engine_state(&state).await;
    }
    handle_get_status(State(state)).await.into_response()
}

async fn handle_reset_learning(State(state): State<AppState>) -> impl IntoResponse {
    {
        let mut engine = state.engine.lock().await;
        engine.reset_learning();
    }
    info!("all learned rates reset");
    persist_engine_state(&state).await;
    handle_get_status(State(state)).await.into_response()
}

fn parse_zone_param(
    params: &HashMap<String, String>,
) -> Result<ZoneId, axum::response::Response> {
    let Some(zone) = params.get("zone") else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing 'zone' parameter",
        ));
    };
    ZoneId::parse(zone).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            &CommandError::UnknownZone(zone.clone()).to_string(),
        )
    })
}

async fn persist_engine_state(state: &AppState) {
    let snapshot = state.engine.lock().await.state().clone();
    if let Err(err) = state.store.save_engine_state(&snapshot).await {
        warn!("failed to persist engine state: {err:#}");
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("DUALZONE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.dualzone"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            state_path: Arc::new(data_dir.join("state.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_engine_state(&self) -> anyhow::Result<Option<EngineState>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.state_path.as_ref()).await {
            Ok(raw) => Ok(Some(serde_json::from_slice::<EngineState>(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_engine_state(&self, engine_state: &EngineState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.state_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(engine_state)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
