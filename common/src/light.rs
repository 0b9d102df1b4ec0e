use crate::{curtain::CurtainCommand, sensor::LightLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightDecision {
    pub status_light_on: bool,
    pub curtain: Option<CurtainCommand>,
}

/// Drives the status light and curtain from ambient light alone.
///
/// The sensor reads lower when the room is brighter: above `cutoff` the
/// light goes off and the curtain opens, at or below it the light comes on
/// and the curtain closes. A critical condition owns the curtain, so only
/// the status light is decided then.
pub fn apply_light_automation(
    level: LightLevel,
    cutoff: LightLevel,
    critical_condition: bool,
) -> LightDecision {
    let (status_light_on, command) = if level > cutoff {
        (false, CurtainCommand::Open)
    } else {
        (true, CurtainCommand::Close)
    };

    LightDecision {
        status_light_on,
        curtain: (!critical_condition).then_some(command),
    }
}
