use crate::{
    config::{AlarmPolicy, Thresholds},
    curtain::CurtainCommand,
    sensor::Sample,
    types::{CriticalCause, Zone},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub zone: Zone,
    pub alarm_on: bool,
    /// Only a critical zone claims the curtain; otherwise light automation decides.
    pub curtain: Option<CurtainCommand>,
    pub cause: Option<CriticalCause>,
}

pub fn classify(sample: &Sample, thresholds: &Thresholds) -> Zone {
    let Sample {
        temperature,
        humidity,
    } = *sample;

    if temperature >= thresholds.critical_temp || humidity >= thresholds.critical_humidity {
        return Zone::Critical;
    }

    let warm = temperature >= thresholds.optimal_temp && temperature < thresholds.critical_temp;
    let humid = humidity >= thresholds.optimal_humidity && humidity < thresholds.critical_humidity;
    if warm || humid {
        Zone::Optimal
    } else {
        Zone::Normal
    }
}

pub fn evaluate(sample: &Sample, thresholds: &Thresholds, alarm_policy: AlarmPolicy) -> Evaluation {
    match classify(sample, thresholds) {
        Zone::Critical => {
            // Temperature wins when both dimensions are critical.
            let cause = if sample.temperature >= thresholds.critical_temp {
                CriticalCause::Temperature
            } else {
                CriticalCause::Humidity
            };
            Evaluation {
                zone: Zone::Critical,
                alarm_on: alarm_policy == AlarmPolicy::Sound,
                curtain: Some(CurtainCommand::Open),
                cause: Some(cause),
            }
        }
        zone => Evaluation {
            zone,
            alarm_on: false,
            curtain: None,
            cause: None,
        },
    }
}
