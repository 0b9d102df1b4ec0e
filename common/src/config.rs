use serde::{Deserialize, Serialize};

use crate::error::ThresholdError;

pub const SERVO_MAX_DEG: u8 = 180;

/// User-configured comparison points for the control evaluator.
///
/// Missing fields take their defaults when read back; callers validate the
/// merged set before using it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    pub optimal_temp: f32,
    pub critical_temp: f32,
    pub optimal_humidity: f32,
    pub critical_humidity: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            optimal_temp: 24.0,
            critical_temp: 30.0,
            optimal_humidity: 60.0,
            critical_humidity: 80.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        let fields = [
            ("optimalTemp", self.optimal_temp),
            ("criticalTemp", self.critical_temp),
            ("optimalHumidity", self.optimal_humidity),
            ("criticalHumidity", self.critical_humidity),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ThresholdError::NotFinite { field });
            }
        }

        if self.optimal_temp >= self.critical_temp {
            return Err(ThresholdError::TemperatureOrder {
                optimal: self.optimal_temp,
                critical: self.critical_temp,
            });
        }
        if self.optimal_humidity >= self.critical_humidity {
            return Err(ThresholdError::HumidityOrder {
                optimal: self.optimal_humidity,
                critical: self.critical_humidity,
            });
        }
        Ok(())
    }
}

/// Partial threshold write; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsUpdate {
    #[serde(default)]
    pub optimal_temp: Option<f32>,
    #[serde(default)]
    pub critical_temp: Option<f32>,
    #[serde(default)]
    pub optimal_humidity: Option<f32>,
    #[serde(default)]
    pub critical_humidity: Option<f32>,
}

impl ThresholdsUpdate {
    pub fn is_empty(&self) -> bool {
        self.optimal_temp.is_none()
            && self.critical_temp.is_none()
            && self.optimal_humidity.is_none()
            && self.critical_humidity.is_none()
    }

    pub fn apply_to(&self, current: &Thresholds) -> Thresholds {
        Thresholds {
            optimal_temp: self.optimal_temp.unwrap_or(current.optimal_temp),
            critical_temp: self.critical_temp.unwrap_or(current.critical_temp),
            optimal_humidity: self.optimal_humidity.unwrap_or(current.optimal_humidity),
            critical_humidity: self.critical_humidity.unwrap_or(current.critical_humidity),
        }
    }
}

/// Whether the alarm sounds while a critical condition is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmPolicy {
    #[default]
    Sound,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub closed_deg: u8,
    pub open_deg: u8,
    pub step_deg: u8,
    pub step_interval_ms: u64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            closed_deg: 0,
            open_deg: SERVO_MAX_DEG,
            step_deg: 1,
            step_interval_ms: 50,
        }
    }
}

impl ServoConfig {
    pub fn sanitize(&mut self) {
        self.closed_deg = self.closed_deg.min(SERVO_MAX_DEG);
        self.open_deg = self.open_deg.min(SERVO_MAX_DEG);
        if self.closed_deg == self.open_deg {
            let defaults = Self::default();
            self.closed_deg = defaults.closed_deg;
            self.open_deg = defaults.open_deg;
        }
        self.step_deg = self.step_deg.clamp(1, 90);
        self.step_interval_ms = self.step_interval_ms.clamp(1, 1_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub state_publish_interval_ms: u64,
    /// Light levels above this count as a bright room.
    pub light_cutoff: u16,
    pub alarm_policy: AlarmPolicy,
    pub servo: ServoConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            sensor_stale_timeout_ms: 30_000,
            state_publish_interval_ms: 10_000,
            light_cutoff: 30,
            alarm_policy: AlarmPolicy::Sound,
            servo: ServoConfig::default(),
        }
    }
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(100, 60_000);
        self.sensor_stale_timeout_ms = self.sensor_stale_timeout_ms.clamp(1_000, 600_000);
        self.state_publish_interval_ms = self.state_publish_interval_ms.clamp(1_000, 3_600_000);
        self.servo.sanitize();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub network: NetworkConfig,
}
