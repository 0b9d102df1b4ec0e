use crate::{
    config::{AlarmPolicy, ControlConfig, Thresholds},
    control::evaluate,
    curtain::{CurtainActuator, CurtainCommand, CurtainSweep},
    error::{SensorError, ThresholdError},
    light::apply_light_automation,
    sensor::{LightLevel, Reading, SensorCache},
    types::{ControllerStatePayload, ControllerStatus, CriticalCause, DisplayMessage, Zone},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    SetAlarm(bool),
    SetStatusLight(bool),
    Display(DisplayMessage),
    ClearDisplay,
    MoveCurtain(CurtainSweep),
}

/// Flags shared by the evaluator, light automation and curtain actuator.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub active: bool,
    pub critical_condition: bool,
    pub curtain: CurtainActuator,
}

impl ControlState {
    pub fn curtain_open(&self) -> bool {
        self.curtain.is_open()
    }
}

// Last value sent to each output; `None` forces the next write.
#[derive(Debug, Clone, Default)]
struct Outputs {
    alarm: Option<bool>,
    status_light: Option<bool>,
    display: Option<DisplayMessage>,
}

#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    config: ControlConfig,
    thresholds: Thresholds,
    state: ControlState,
    sensors: SensorCache,

    last_zone: Option<Zone>,
    last_cause: Option<CriticalCause>,
    outputs: Outputs,
}

impl ThermostatEngine {
    pub fn new(mut config: ControlConfig, thresholds: Thresholds) -> Self {
        config.sanitize();
        let thresholds = match thresholds.validate() {
            Ok(()) => thresholds,
            Err(_) => Thresholds::default(),
        };
        Self {
            sensors: SensorCache::new(config.sensor_stale_timeout_ms),
            state: ControlState {
                active: true,
                critical_condition: false,
                curtain: CurtainActuator::new(config.servo),
            },
            config,
            thresholds,
            last_zone: None,
            last_cause: None,
            outputs: Outputs::default(),
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn sensors(&self) -> &SensorCache {
        &self.sensors
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn last_zone(&self) -> Option<Zone> {
        self.last_zone
    }

    pub fn update_temperature(&mut self, celsius: f32, now_ms: u64) -> Result<(), SensorError> {
        self.sensors.update_temperature(celsius, now_ms)
    }

    pub fn update_humidity(&mut self, percent: f32, now_ms: u64) -> Result<(), SensorError> {
        self.sensors.update_humidity(percent, now_ms)
    }

    pub fn update_light(&mut self, level: LightLevel, now_ms: u64) {
        self.sensors.update_light(level, now_ms);
    }

    pub fn mark_sensor_offline(&mut self) {
        self.sensors.mark_offline();
    }

    /// Replaces the thresholds after validating them. Returns whether anything changed.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<bool, ThresholdError> {
        thresholds.validate()?;
        if self.thresholds == thresholds {
            return Ok(false);
        }
        self.thresholds = thresholds;
        Ok(true)
    }

    /// Starting re-evaluates at `now_ms` so every output is re-asserted at once.
    pub fn set_active(&mut self, active: bool, now_ms: u64) -> (bool, Vec<EngineAction>) {
        if self.state.active == active {
            return (false, Vec::new());
        }
        self.state.active = active;

        let mut actions = Vec::new();
        if active {
            self.outputs = Outputs::default();
            actions = self.tick(now_ms);
        } else {
            self.state.critical_condition = false;
            self.last_zone = None;
            self.last_cause = None;

            actions.push(EngineAction::SetAlarm(false));
            self.outputs.alarm = Some(false);
            actions.push(EngineAction::ClearDisplay);
            self.outputs.display = None;
            self.move_curtain(CurtainCommand::Close, &mut actions);
        }
        (true, actions)
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if !self.state.active {
            return actions;
        }

        self.evaluate_environment(now_ms, &mut actions);
        self.evaluate_light(now_ms, &mut actions);

        actions
    }

    pub fn status(&self, now_ms: u64, servo_angle: u8) -> ControllerStatus {
        ControllerStatus {
            temperature: self.sensors.last_temperature(),
            humidity: self.sensors.last_humidity(),
            light_level: self.sensors.last_light(),
            sensor_valid: self.sensors.read_environment(now_ms).is_available(),
            light_valid: self.sensors.read_light(now_ms).is_available(),
            zone: self.last_zone.map(Zone::as_str),
            critical_cause: self.last_cause.map(CriticalCause::as_str),
            active: self.state.active,
            critical_condition: self.state.critical_condition,
            curtain_open: self.state.curtain_open(),
            servo_angle,
            alarm_on: self.outputs.alarm.unwrap_or(false),
            status_light_on: self.outputs.status_light.unwrap_or(false),
            alarm_policy: match self.config.alarm_policy {
                AlarmPolicy::Sound => "SOUND",
                AlarmPolicy::Silent => "SILENT",
            },
            light_cutoff: self.config.light_cutoff,
            thresholds: self.thresholds,
            display: self
                .outputs
                .display
                .map(|message| message.lines())
                .unwrap_or_default(),
        }
    }

    pub fn state_payload(&self, now_ms: u64) -> ControllerStatePayload {
        ControllerStatePayload {
            temp: self.sensors.last_temperature(),
            humidity: self.sensors.last_humidity(),
            light: self.sensors.last_light(),
            sensor_valid: self.sensors.read_environment(now_ms).is_available(),
            zone: self.last_zone.map(Zone::as_str),
            active: self.state.active,
            critical: self.state.critical_condition,
            curtain_open: self.state.curtain_open(),
            alarm: self.outputs.alarm.unwrap_or(false),
            status_light: self.outputs.status_light.unwrap_or(false),
        }
    }

    fn evaluate_environment(&mut self, now_ms: u64, actions: &mut Vec<EngineAction>) {
        // No fresh sample: leave every output and the critical flag as they are.
        let Reading::Available(sample) = self.sensors.read_environment(now_ms) else {
            return;
        };

        let evaluation = evaluate(&sample, &self.thresholds, self.config.alarm_policy);
        self.state.critical_condition = evaluation.zone == Zone::Critical;
        self.last_zone = Some(evaluation.zone);
        self.last_cause = evaluation.cause;

        self.set_alarm(evaluation.alarm_on, actions);

        let message = match evaluation.cause {
            Some(cause) => DisplayMessage::Critical(cause),
            None => DisplayMessage::Readings {
                sample,
                thresholds: self.thresholds,
            },
        };
        self.show(message, actions);

        if let Some(command) = evaluation.curtain {
            self.move_curtain(command, actions);
        }
    }

    fn evaluate_light(&mut self, now_ms: u64, actions: &mut Vec<EngineAction>) {
        let Reading::Available(level) = self.sensors.read_light(now_ms) else {
            return;
        };

        let decision =
            apply_light_automation(level, self.config.light_cutoff, self.state.critical_condition);
        self.set_status_light(decision.status_light_on, actions);

        if let Some(command) = decision.curtain {
            self.move_curtain(command, actions);
        }
    }

    fn set_alarm(&mut self, on: bool, actions: &mut Vec<EngineAction>) {
        if self.outputs.alarm != Some(on) {
            self.outputs.alarm = Some(on);
            actions.push(EngineAction::SetAlarm(on));
        }
    }

    fn set_status_light(&mut self, on: bool, actions: &mut Vec<EngineAction>) {
        if self.outputs.status_light != Some(on) {
            self.outputs.status_light = Some(on);
            actions.push(EngineAction::SetStatusLight(on));
        }
    }

    fn show(&mut self, message: DisplayMessage, actions: &mut Vec<EngineAction>) {
        if self.outputs.display != Some(message) {
            self.outputs.display = Some(message);
            actions.push(EngineAction::Display(message));
        }
    }

    fn move_curtain(&mut self, command: CurtainCommand, actions: &mut Vec<EngineAction>) {
        if let Some(sweep) = self.state.curtain.manage(command) {
            actions.push(EngineAction::MoveCurtain(sweep));
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn engine() -> ThermostatEngine {
        ThermostatEngine::new(
            ControlConfig::default(),
            Thresholds {
                optimal_temp: 20.0,
                critical_temp: 28.0,
                optimal_humidity: 70.0,
                critical_humidity: 85.0,
            },
        )
    }

    fn feed(engine: &mut ThermostatEngine, temperature: f32, humidity: f32, light: u16, now_ms: u64) {
        engine.update_temperature(temperature, now_ms).unwrap();
        engine.update_humidity(humidity, now_ms).unwrap();
        engine.update_light(light, now_ms);
    }

    fn curtain_moves(actions: &[EngineAction]) -> Vec<CurtainCommand> {
        actions
            .iter()
            .filter_map(|action| match action {
                EngineAction::MoveCurtain(sweep) => Some(sweep.command()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn critical_temperature_opens_curtain_and_sounds_alarm() {
        let mut engine = engine();
        feed(&mut engine, 30.0, 40.0, 45, 1_000);

        let actions = engine.tick(1_000);

        assert!(actions.contains(&EngineAction::SetAlarm(true)));
        assert!(actions.contains(&EngineAction::Display(DisplayMessage::Critical(
            CriticalCause::Temperature
        ))));
        assert_eq!(curtain_moves(&actions), vec![CurtainCommand::Open]);
        assert!(engine.state().critical_condition);
        assert!(engine.state().curtain_open());
        assert_eq!(engine.last_zone(), Some(Zone::Critical));
    }

    #[test]
    fn critical_override_beats_dark_room() {
        let mut engine = engine();
        feed(&mut engine, 30.0, 40.0, 5, 1_000);

        let actions = engine.tick(1_000);

        // Light automation still drives the status light but never the curtain.
        assert!(actions.contains(&EngineAction::SetStatusLight(true)));
        assert_eq!(curtain_moves(&actions), vec![CurtainCommand::Open]);
        assert!(engine.state().curtain_open());
    }

    #[test]
    fn light_automation_resumes_after_critical_clears() {
        let mut engine = engine();
        feed(&mut engine, 30.0, 40.0, 5, 1_000);
        engine.tick(1_000);

        feed(&mut engine, 22.0, 40.0, 5, 2_000);
        let actions = engine.tick(2_000);

        assert!(!engine.state().critical_condition);
        assert!(actions.contains(&EngineAction::SetAlarm(false)));
        assert_eq!(curtain_moves(&actions), vec![CurtainCommand::Close]);
        assert!(!engine.state().curtain_open());
        assert_eq!(engine.last_zone(), Some(Zone::Optimal));
    }

    #[test]
    fn optimal_scenario_keeps_alarm_off() {
        let mut engine = engine();
        feed(&mut engine, 22.0, 40.0, 45, 1_000);

        let actions = engine.tick(1_000);

        assert_eq!(engine.last_zone(), Some(Zone::Optimal));
        assert!(actions.contains(&EngineAction::SetAlarm(false)));
        assert!(actions.contains(&EngineAction::SetStatusLight(false)));
        assert_eq!(curtain_moves(&actions), vec![CurtainCommand::Open]);
    }

    #[test]
    fn unchanged_outputs_are_not_reemitted() {
        let mut engine = engine();
        feed(&mut engine, 22.0, 40.0, 5, 1_000);
        assert!(!engine.tick(1_000).is_empty());

        feed(&mut engine, 22.0, 40.0, 5, 2_000);
        assert!(engine.tick(2_000).is_empty());
    }

    #[test]
    fn missing_environment_reading_skips_classification() {
        let mut engine = engine();
        feed(&mut engine, 30.0, 40.0, 45, 0);
        engine.tick(0);

        engine.mark_sensor_offline();
        let actions = engine.tick(1_000);

        assert!(actions.is_empty());
        assert!(engine.state().critical_condition);
        assert_eq!(engine.last_zone(), Some(Zone::Critical));
    }

    #[test]
    fn stale_environment_still_runs_light_automation() {
        let mut engine = engine();
        engine.update_light(5, 0);

        let actions = engine.tick(100);

        assert_eq!(actions, vec![EngineAction::SetStatusLight(true)]);
        assert_eq!(engine.last_zone(), None);
    }

    #[test]
    fn inactive_engine_does_nothing() {
        let mut engine = engine();
        engine.set_active(false, 0);
        feed(&mut engine, 30.0, 40.0, 5, 1_000);

        assert!(engine.tick(1_000).is_empty());
        assert!(!engine.state().curtain_open());
    }

    #[test]
    fn stopping_returns_safe_rest_actions() {
        let mut engine = engine();
        feed(&mut engine, 30.0, 40.0, 45, 1_000);
        engine.tick(1_000);

        let (changed, actions) = engine.set_active(false, 1_200);

        assert!(changed);
        assert_eq!(actions[0], EngineAction::SetAlarm(false));
        assert_eq!(actions[1], EngineAction::ClearDisplay);
        assert_eq!(curtain_moves(&actions), vec![CurtainCommand::Close]);
        assert!(!engine.state().critical_condition);
        assert!(!engine.state().curtain_open());

        let (changed, actions) = engine.set_active(false, 1_400);
        assert!(!changed);
        assert!(actions.is_empty());
    }

    #[test]
    fn restarting_reemits_outputs() {
        let mut engine = engine();
        feed(&mut engine, 22.0, 40.0, 45, 1_000);
        engine.tick(1_000);
        engine.set_active(false, 1_200);

        let (changed, actions) = engine.set_active(true, 1_500);
        assert!(changed);
        assert!(actions.contains(&EngineAction::SetAlarm(false)));
        assert!(actions.contains(&EngineAction::SetStatusLight(false)));
        assert!(actions
            .iter()
            .any(|action| matches!(action, EngineAction::Display(_))));
        assert_eq!(curtain_moves(&actions), vec![CurtainCommand::Open]);

        assert!(engine.tick(2_000).is_empty());
    }

    #[test]
    fn state_payload_tracks_sensor_freshness() {
        let mut engine = engine();
        feed(&mut engine, 22.0, 40.0, 45, 1_000);
        engine.tick(1_000);

        let payload = engine.state_payload(2_000);
        assert!(payload.sensor_valid);
        assert_eq!(payload.zone, Some("OPTIMAL"));

        let stale_at = 1_000 + engine.config().sensor_stale_timeout_ms + 1;
        assert!(!engine.state_payload(stale_at).sensor_valid);
        assert_eq!(engine.state_payload(stale_at).temp, Some(22.0));
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let mut engine = engine();
        let before = *engine.thresholds();

        let result = engine.set_thresholds(Thresholds {
            optimal_temp: 30.0,
            critical_temp: 25.0,
            ..before
        });

        assert!(matches!(result, Err(ThresholdError::TemperatureOrder { .. })));
        assert_eq!(*engine.thresholds(), before);
        assert_eq!(engine.set_thresholds(before), Ok(false));
    }

    #[test]
    fn new_thresholds_apply_on_next_tick() {
        let mut engine = engine();
        feed(&mut engine, 26.0, 40.0, 45, 1_000);
        engine.tick(1_000);
        assert_eq!(engine.last_zone(), Some(Zone::Optimal));

        let changed = engine
            .set_thresholds(Thresholds {
                critical_temp: 25.0,
                ..*engine.thresholds()
            })
            .unwrap();
        assert!(changed);

        engine.tick(1_500);
        assert_eq!(engine.last_zone(), Some(Zone::Critical));
    }

    #[test]
    fn status_reports_outputs() {
        let mut engine = engine();
        feed(&mut engine, 30.0, 40.0, 5, 1_000);
        engine.tick(1_000);

        let status = engine.status(1_000, 180);

        assert_eq!(status.zone, Some("CRITICAL"));
        assert_eq!(status.critical_cause, Some("TEMPERATURE"));
        assert!(status.alarm_on);
        assert!(status.status_light_on);
        assert!(status.curtain_open);
        assert!(status.sensor_valid);
        assert_eq!(status.display, vec!["Critical temperature!".to_string()]);
    }
}
