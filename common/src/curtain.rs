//! Curtain actuator: a two-state machine whose transitions produce servo sweeps.

use crate::config::ServoConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtainCommand {
    Open,
    Close,
}

impl CurtainCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
        }
    }
}

/// A bounded, monotonic servo motion between two positions.
///
/// The sweep itself holds no progress; [`CurtainSweep::steps`] hands out a
/// fresh iterator each time, so the same sweep can be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurtainSweep {
    command: CurtainCommand,
    from_deg: u8,
    to_deg: u8,
    step_deg: u8,
    step_interval_ms: u64,
}

impl CurtainSweep {
    fn new(command: CurtainCommand, from_deg: u8, to_deg: u8, servo: &ServoConfig) -> Self {
        Self {
            command,
            from_deg,
            to_deg,
            step_deg: servo.step_deg.max(1),
            step_interval_ms: servo.step_interval_ms,
        }
    }

    pub fn command(&self) -> CurtainCommand {
        self.command
    }

    pub fn from_deg(&self) -> u8 {
        self.from_deg
    }

    pub fn to_deg(&self) -> u8 {
        self.to_deg
    }

    pub fn step_interval_ms(&self) -> u64 {
        self.step_interval_ms
    }

    pub fn steps(&self) -> SweepSteps {
        SweepSteps {
            next: Some(self.from_deg),
            to_deg: self.to_deg,
            step_deg: self.step_deg,
        }
    }

    /// Number of servo writes, both extremes included.
    pub fn step_count(&self) -> usize {
        let span = self.from_deg.abs_diff(self.to_deg) as usize;
        span.div_ceil(self.step_deg as usize) + 1
    }

    /// Each write is followed by one step interval.
    pub fn duration_ms(&self) -> u64 {
        self.step_count() as u64 * self.step_interval_ms
    }
}

impl<'a> IntoIterator for &'a CurtainSweep {
    type Item = u8;
    type IntoIter = SweepSteps;

    fn into_iter(self) -> Self::IntoIter {
        self.steps()
    }
}

#[derive(Debug, Clone)]
pub struct SweepSteps {
    next: Option<u8>,
    to_deg: u8,
    step_deg: u8,
}

impl Iterator for SweepSteps {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let current = self.next?;
        self.next = if current == self.to_deg {
            None
        } else if current < self.to_deg {
            Some(current.saturating_add(self.step_deg).min(self.to_deg))
        } else {
            Some(current.saturating_sub(self.step_deg).max(self.to_deg))
        };
        Some(current)
    }
}

/// Owns the curtain's open/closed flag.
///
/// The flag tracks the last commanded terminal position; there is no
/// position feedback from the servo.
#[derive(Debug, Clone)]
pub struct CurtainActuator {
    servo: ServoConfig,
    open: bool,
}

impl CurtainActuator {
    pub fn new(servo: ServoConfig) -> Self {
        Self { servo, open: false }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn servo(&self) -> &ServoConfig {
        &self.servo
    }

    pub fn rest_position_deg(&self) -> u8 {
        if self.open {
            self.servo.open_deg
        } else {
            self.servo.closed_deg
        }
    }

    /// Returns the sweep to perform, or `None` when already in position.
    pub fn manage(&mut self, command: CurtainCommand) -> Option<CurtainSweep> {
        match (self.open, command) {
            (false, CurtainCommand::Open) => {
                self.open = true;
                Some(CurtainSweep::new(
                    command,
                    self.servo.closed_deg,
                    self.servo.open_deg,
                    &self.servo,
                ))
            }
            (true, CurtainCommand::Close) => {
                self.open = false;
                Some(CurtainSweep::new(
                    command,
                    self.servo.open_deg,
                    self.servo.closed_deg,
                    &self.servo,
                ))
            }
            _ => None,
        }
    }
}
