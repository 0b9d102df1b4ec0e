use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use thiserror::Error;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use climate_common::{
    ControllerStatePayload, ControllerStatus, Reading, RuntimeConfig, Sample, ThermostatEngine,
    ThresholdError, Thresholds, ThresholdsUpdate, Zone, TOPIC_CMD_ACTIVE, TOPIC_CMD_THRESHOLDS,
    TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_LIGHT, TOPIC_SENSOR_STATUS,
    TOPIC_SENSOR_TEMP,
};

use crate::{
    actuators::{HostActuators, OutputSnapshot},
    store::AppStore,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ThermostatEngine>>,
    actuators: HostActuators,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: ControllerStatus,
    outputs: OutputSnapshot,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

#[derive(Debug, Serialize)]
struct StateMessage {
    #[serde(flatten)]
    state: ControllerStatePayload,
    ts: i64,
}

#[derive(Debug, Error)]
enum ThresholdWriteError {
    #[error(transparent)]
    Invalid(#[from] ThresholdError),
    #[error("failed to persist thresholds: {0:#}")]
    Persist(anyhow::Error),
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.control.sanitize();
    if let Err(err) = runtime.thresholds.validate() {
        warn!("stored thresholds rejected ({err}); using defaults until the next save");
        runtime.thresholds = Thresholds::default();
    }

    let engine = ThermostatEngine::new(runtime.control.clone(), runtime.thresholds);
    let actuators = HostActuators::spawn(engine.state().curtain.rest_position_deg());

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("climate-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        actuators,
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone(), runtime.control.tick_interval_ms);
    spawn_state_publish_loop(app_state.clone(), runtime.control.state_publish_interval_ms);

    let app = router(app_state);

    let port = std::env::var("CLIMATE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route(
            "/api/thresholds",
            get(handle_get_thresholds).put(handle_put_thresholds),
        )
        .route("/api/system/start", post(handle_system_start))
        .route("/api/system/stop", post(handle_system_stop))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_TEMP,
        TOPIC_SENSOR_HUMIDITY,
        TOPIC_SENSOR_LIGHT,
        TOPIC_SENSOR_STATUS,
        TOPIC_CMD_ACTIVE,
        TOPIC_CMD_THRESHOLDS,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
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

fn spawn_control_loop(app_state: AppState, tick_interval_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_interval_ms));
        let mut environment_ok = true;
        let mut last_zone: Option<Zone> = None;

        loop {
            interval.tick().await;
            let (environment, zone) = run_control_tick(&app_state, monotonic_ms()).await;

            match environment {
                Some(Reading::Unavailable(reason)) if environment_ok => {
                    warn!("skipping classification: {reason}");
                    environment_ok = false;
                }
                Some(Reading::Available(_)) if !environment_ok => {
                    info!("environment readings restored");
                    environment_ok = true;
                }
                _ => {}
            }

            if zone != last_zone {
                if let Some(zone) = zone {
                    info!("zone is now {}", zone.as_str());
                }
                last_zone = zone;
            }
        }
    });
}

/// One control pass. Actions reach the actuators before the engine lock is
/// released, so a concurrent stop can never be overtaken by a stale tick.
async fn run_control_tick(
    app_state: &AppState,
    now_ms: u64,
) -> (Option<Reading<Sample>>, Option<Zone>) {
    let mut engine = app_state.engine.lock().await;
    let environment = engine
        .is_active()
        .then(|| engine.sensors().read_environment(now_ms));
    let actions = engine.tick(now_ms);
    if !actions.is_empty() {
        app_state.actuators.execute(actions).await;
    }
    (environment, engine.last_zone())
}

fn spawn_state_publish_loop(app_state: AppState, publish_interval_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(publish_interval_ms));
        loop {
            interval.tick().await;

            let state = app_state.engine.lock().await.state_payload(monotonic_ms());
            let message = StateMessage {
                state,
                ts: Utc::now().timestamp(),
            };

            match serde_json::to_vec(&message) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
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
    let message = message.trim();
    let now_ms = monotonic_ms();

    match topic.as_str() {
        TOPIC_SENSOR_TEMP => {
            let celsius = message
                .parse::<f32>()
                .with_context(|| format!("unparseable temperature {message:?}"))?;
            let result = app_state
                .engine
                .lock()
                .await
                .update_temperature(celsius, now_ms);
            if let Err(err) = result {
                warn!("rejected sensor value: {err}");
            }
        }
        TOPIC_SENSOR_HUMIDITY => {
            let percent = message
                .parse::<f32>()
                .with_context(|| format!("unparseable humidity {message:?}"))?;
            let result = app_state
                .engine
                .lock()
                .await
                .update_humidity(percent, now_ms);
            if let Err(err) = result {
                warn!("rejected sensor value: {err}");
            }
        }
        TOPIC_SENSOR_LIGHT => {
            let level = message
                .parse::<u16>()
                .with_context(|| format!("unparseable light level {message:?}"))?;
            app_state.engine.lock().await.update_light(level, now_ms);
        }
        TOPIC_SENSOR_STATUS => match message {
            "offline" => {
                warn!("sensor node went offline");
                app_state.engine.lock().await.mark_sensor_offline();
            }
            "online" => info!("sensor node online"),
            other => warn!("unknown sensor status {other:?}"),
        },
        TOPIC_CMD_ACTIVE => match message.to_ascii_lowercase().as_str() {
            "on" | "start" => {
                set_system_active(app_state, true).await;
            }
            "off" | "stop" => {
                set_system_active(app_state, false).await;
            }
            other => warn!("unknown activity command {other:?}"),
        },
        TOPIC_CMD_THRESHOLDS => {
            let update = serde_json::from_str::<ThresholdsUpdate>(message)
                .context("malformed thresholds command")?;
            if update.is_empty() {
                return Ok(());
            }
            write_thresholds(app_state, update).await?;
        }
        _ => {}
    }

    Ok(())
}

async fn set_system_active(state: &AppState, active: bool) -> bool {
    let mut engine = state.engine.lock().await;
    let (changed, actions) = engine.set_active(active, monotonic_ms());
    if changed {
        info!("system {}", if active { "started" } else { "stopped" });
    }
    state.actuators.execute(actions).await;
    changed
}

/// Validates, persists and applies a threshold change.
///
/// The engine stays locked for the whole write, so no control tick can
/// observe thresholds that are not yet on disk.
async fn write_thresholds(
    state: &AppState,
    update: ThresholdsUpdate,
) -> Result<Thresholds, ThresholdWriteError> {
    let mut engine = state.engine.lock().await;
    let candidate = update.apply_to(engine.thresholds());
    candidate.validate()?;

    state
        .store
        .save_thresholds(&candidate)
        .await
        .map_err(ThresholdWriteError::Persist)?;

    if engine.set_thresholds(candidate)? {
        info!(
            "thresholds updated: optimal {:.1}C/{:.1}%, critical {:.1}C/{:.1}%",
            candidate.optimal_temp,
            candidate.optimal_humidity,
            candidate.critical_temp,
            candidate.critical_humidity
        );
    }
    Ok(candidate)
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let outputs = state.actuators.snapshot().await;
    let status = {
        let engine = state.engine.lock().await;
        engine.status(monotonic_ms(), outputs.servo_angle)
    };

    Json(StatusResponse {
        status,
        outputs,
        now_epoch: Utc::now().timestamp(),
    })
}

async fn handle_get_thresholds(State(state): State<AppState>) -> impl IntoResponse {
    let thresholds = *state.engine.lock().await.thresholds();
    Json(thresholds)
}

async fn handle_put_thresholds(
    State(state): State<AppState>,
    Json(update): Json<ThresholdsUpdate>,
) -> impl IntoResponse {
    if update.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No threshold fields supplied");
    }

    match write_thresholds(&state, update).await {
        Ok(thresholds) => Json(thresholds).into_response(),
        Err(ThresholdWriteError::Invalid(err)) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err @ ThresholdWriteError::Persist(_)) => {
            warn!("{err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist thresholds",
            )
        }
    }
}

async fn handle_system_start(State(state): State<AppState>) -> impl IntoResponse {
    set_system_active(&state, true).await;
    handle_get_status(State(state)).await.into_response()
}

async fn handle_system_stop(State(state): State<AppState>) -> impl IntoResponse {
    set_system_active(&state, false).await;
    handle_get_status(State(state)).await.into_response()
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

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use climate_common::{ControlConfig, ServoConfig};

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("climate-host-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn app_state(data_dir: PathBuf) -> AppState {
        app_state_with(ControlConfig::default(), data_dir)
    }

    fn app_state_with(config: ControlConfig, data_dir: PathBuf) -> AppState {
        let engine = ThermostatEngine::new(config, Thresholds::default());
        let (mqtt, _eventloop) =
            AsyncClient::new(MqttOptions::new("climate-controller-test", "127.0.0.1", 1883), 8);
        AppState {
            actuators: HostActuators::spawn(engine.state().curtain.rest_position_deg()),
            engine: Arc::new(Mutex::new(engine)),
            mqtt,
            store: AppStore::at(data_dir),
        }
    }

    #[tokio::test]
    async fn valid_update_is_persisted_then_applied() {
        let dir = scratch_dir("valid");
        let state = app_state(dir.clone());

        let response = handle_put_thresholds(
            State(state.clone()),
            Json(ThresholdsUpdate {
                critical_temp: Some(26.0),
                ..ThresholdsUpdate::default()
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.engine.lock().await.thresholds().critical_temp, 26.0);
        let stored = state.store.load_runtime_config().await.unwrap();
        assert_eq!(stored.thresholds.critical_temp, 26.0);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn out_of_order_update_is_rejected() {
        let dir = scratch_dir("invalid");
        let state = app_state(dir.clone());

        let response = handle_put_thresholds(
            State(state.clone()),
            Json(ThresholdsUpdate {
                optimal_humidity: Some(90.0),
                ..ThresholdsUpdate::default()
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*state.engine.lock().await.thresholds(), Thresholds::default());
        assert!(!dir.join("runtime.json").exists());
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let state = app_state(scratch_dir("empty"));

        let response = handle_put_thresholds(State(state), Json(ThresholdsUpdate::default()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stop_and_start_toggle_the_engine() {
        let state = app_state(scratch_dir("toggle"));

        assert!(set_system_active(&state, false).await);
        assert!(!state.engine.lock().await.is_active());
        assert!(!set_system_active(&state, false).await);

        assert!(set_system_active(&state, true).await);
        assert!(state.engine.lock().await.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_a_critical_tick_leaves_outputs_at_rest() {
        let config = ControlConfig {
            servo: ServoConfig {
                step_deg: 90,
                step_interval_ms: 1,
                ..ServoConfig::default()
            },
            ..ControlConfig::default()
        };

        for round in 0..20 {
            let state = app_state_with(config.clone(), scratch_dir(&format!("race-{round}")));
            {
                let mut engine = state.engine.lock().await;
                engine.update_temperature(35.0, 0).unwrap();
                engine.update_humidity(40.0, 0).unwrap();
            }

            let ticker = {
                let state = state.clone();
                tokio::spawn(async move { run_control_tick(&state, 10).await })
            };
            let stopper = {
                let state = state.clone();
                tokio::spawn(async move { set_system_active(&state, false).await })
            };
            ticker.await.unwrap();
            assert!(stopper.await.unwrap());

            {
                let engine = state.engine.lock().await;
                assert!(!engine.is_active());
                assert!(!engine.state().curtain_open());
            }

            let settled = tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let outputs = state.actuators.snapshot().await;
                    if outputs.servo_angle == 0 {
                        break outputs;
                    }
                }
            })
            .await
            .unwrap();
            assert!(!settled.alarm_on, "alarm still sounding in round {round}");
            assert!(settled.display.is_empty());
        }
    }

    #[tokio::test]
    async fn tick_reaches_the_actuators_before_returning() {
        let state = app_state(scratch_dir("tick"));
        {
            let mut engine = state.engine.lock().await;
            engine.update_temperature(35.0, 0).unwrap();
            engine.update_humidity(40.0, 0).unwrap();
        }

        let (environment, zone) = run_control_tick(&state, 10).await;

        assert!(matches!(environment, Some(Reading::Available(_))));
        assert_eq!(zone, Some(Zone::Critical));
        let outputs = state.actuators.snapshot().await;
        assert!(outputs.alarm_on);
        assert_eq!(outputs.display, vec!["Critical temperature!".to_string()]);
    }

    #[tokio::test]
    async fn sensor_messages_feed_the_engine() {
        let state = app_state(scratch_dir("sensor"));

        handle_mqtt_message(&state, TOPIC_SENSOR_TEMP.to_string(), b"23.5".to_vec())
            .await
            .unwrap();
        handle_mqtt_message(&state, TOPIC_SENSOR_HUMIDITY.to_string(), b" 48 ".to_vec())
            .await
            .unwrap();
        handle_mqtt_message(&state, TOPIC_SENSOR_LIGHT.to_string(), b"12".to_vec())
            .await
            .unwrap();

        let engine = state.engine.lock().await;
        assert_eq!(engine.sensors().last_temperature(), Some(23.5));
        assert_eq!(engine.sensors().last_humidity(), Some(48.0));
        assert_eq!(engine.sensors().last_light(), Some(12));
    }

    #[tokio::test]
    async fn offline_status_invalidates_readings() {
        let state = app_state(scratch_dir("offline"));
        handle_mqtt_message(&state, TOPIC_SENSOR_TEMP.to_string(), b"23.5".to_vec())
            .await
            .unwrap();

        handle_mqtt_message(&state, TOPIC_SENSOR_STATUS.to_string(), b"offline".to_vec())
            .await
            .unwrap();

        assert!(state.engine.lock().await.sensors().is_offline());
    }

    #[tokio::test]
    async fn garbage_readings_are_errors() {
        let state = app_state(scratch_dir("garbage"));

        let result =
            handle_mqtt_message(&state, TOPIC_SENSOR_TEMP.to_string(), b"warm".to_vec()).await;

        assert!(result.is_err());
        assert_eq!(state.engine.lock().await.sensors().last_temperature(), None);
    }
}
