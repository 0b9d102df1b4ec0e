use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ThresholdError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("optimal temperature {optimal} must be below critical temperature {critical}")]
    TemperatureOrder { optimal: f32, critical: f32 },
    #[error("optimal humidity {optimal} must be below critical humidity {critical}")]
    HumidityOrder { optimal: f32, critical: f32 },
}

/// Raised when a sensor value is rejected before it reaches the cache.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SensorError {
    #[error("{quantity} reading is not a finite number")]
    NotFinite { quantity: &'static str },
    #[error("{quantity} reading {value} is outside {min}..={max}")]
    OutOfRange {
        quantity: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}
