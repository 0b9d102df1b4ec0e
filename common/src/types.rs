use serde::{Deserialize, Serialize};

use crate::{config::Thresholds, sensor::Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Zone {
    Normal,
    Optimal,
    Critical,
}

impl Zone {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Optimal => "OPTIMAL",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CriticalCause {
    Temperature,
    Humidity,
}

impl CriticalCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "TEMPERATURE",
            Self::Humidity => "HUMIDITY",
        }
    }
}

/// Content for the status display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayMessage {
    Critical(CriticalCause),
    Readings {
        sample: Sample,
        thresholds: Thresholds,
    },
}

impl DisplayMessage {
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Critical(CriticalCause::Temperature) => {
                vec!["Critical temperature!".to_string()]
            }
            Self::Critical(CriticalCause::Humidity) => vec!["Critical humidity!".to_string()],
            Self::Readings { sample, thresholds } => vec![
                format!("Temperature: {:.2} *C", sample.temperature),
                format!("Humidity: {:.2} %", sample.humidity),
                String::new(),
                "Preferences".to_string(),
                format!("Opt Temp: {:.2} *C", thresholds.optimal_temp),
                format!("Opt Hum: {:.2} %", thresholds.optimal_humidity),
                format!("Crit Temp: {:.2} *C", thresholds.critical_temp),
                format!("Crit Hum: {:.2} %", thresholds.critical_humidity),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    #[serde(rename = "lightLevel")]
    pub light_level: Option<u16>,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "lightValid")]
    pub light_valid: bool,
    pub zone: Option<&'static str>,
    #[serde(rename = "criticalCause")]
    pub critical_cause: Option<&'static str>,
    pub active: bool,
    #[serde(rename = "criticalCondition")]
    pub critical_condition: bool,
    #[serde(rename = "curtainOpen")]
    pub curtain_open: bool,
    #[serde(rename = "servoAngle")]
    pub servo_angle: u8,
    #[serde(rename = "alarmOn")]
    pub alarm_on: bool,
    #[serde(rename = "statusLightOn")]
    pub status_light_on: bool,
    #[serde(rename = "alarmPolicy")]
    pub alarm_policy: &'static str,
    #[serde(rename = "lightCutoff")]
    pub light_cutoff: u16,
    pub thresholds: Thresholds,
    pub display: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatePayload {
    pub temp: Option<f32>,
    pub humidity: Option<f32>,
    pub light: Option<u16>,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    pub zone: Option<&'static str>,
    pub active: bool,
    pub critical: bool,
    #[serde(rename = "curtainOpen")]
    pub curtain_open: bool,
    pub alarm: bool,
    #[serde(rename = "statusLight")]
    pub status_light: bool,
}
