pub mod config;
pub mod control;
pub mod curtain;
pub mod error;
pub mod light;
pub mod sensor;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{
    AlarmPolicy, ControlConfig, NetworkConfig, RuntimeConfig, ServoConfig, Thresholds,
    ThresholdsUpdate,
};
pub use control::{classify, evaluate, Evaluation};
pub use curtain::{CurtainActuator, CurtainCommand, CurtainSweep, SweepSteps};
pub use error::{SensorError, ThresholdError};
pub use light::{apply_light_automation, LightDecision};
pub use sensor::{LightLevel, Reading, Sample, SensorCache, Unavailable};
pub use thermostat::{ControlState, EngineAction, ThermostatEngine};
pub use topics::*;
pub use types::{ControllerStatePayload, ControllerStatus, CriticalCause, DisplayMessage, Zone};
