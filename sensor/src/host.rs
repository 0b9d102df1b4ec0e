use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tracing::{info, warn};

use climate_common::{
    LightLevel, TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_LIGHT, TOPIC_SENSOR_STATUS, TOPIC_SENSOR_TEMP,
};

/// One simulated pass over the three sensor channels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SimulatedReadings {
    temperature_c: f32,
    humidity: f32,
    light: LightLevel,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let interval_secs = std::env::var("SENSOR_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(2);

    let mut mqtt_options = MqttOptions::new("climate-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("sensor publisher started ({interval_secs}s cadence)");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        // Hardware integration point: DHT22 for temperature/humidity, LDR on the ADC for light.
        let readings = simulate(tick);

        publish(&mqtt, TOPIC_SENSOR_TEMP, format!("{:.1}", readings.temperature_c)).await?;
        publish(&mqtt, TOPIC_SENSOR_HUMIDITY, format!("{:.1}", readings.humidity)).await?;
        publish(&mqtt, TOPIC_SENSOR_LIGHT, readings.light.to_string()).await?;
    }
}

async fn publish(mqtt: &AsyncClient, topic: &str, payload: String) -> anyhow::Result<()> {
    mqtt.publish(topic, QoS::AtLeastOnce, true, payload)
        .await
        .with_context(|| format!("failed to publish {topic}"))
}

/// Temperature climbs from 22 to 32 and back over 40 ticks so the critical
/// band is crossed; the light channel alternates between room light and
/// darkness every 15 ticks.
fn simulate(tick: u64) -> SimulatedReadings {
    let phase = (tick % 40) as f32;
    let ramp = if phase < 20.0 { phase } else { 40.0 - phase };
    let temperature_c = 22.0 + ramp * 0.5;
    let humidity = 45.0 + ((tick % 6) as f32 * 0.5);
    let light = if (tick / 15) % 2 == 0 { 42 } else { 4 };

    SimulatedReadings {
        temperature_c,
        humidity,
        light,
    }
}
