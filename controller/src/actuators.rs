use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use climate_common::{CurtainSweep, EngineAction};

/// What the host outputs are currently driven to; the servo angle moves during a sweep.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSnapshot {
    pub alarm_on: bool,
    pub status_light_on: bool,
    pub servo_angle: u8,
    pub display: Vec<String>,
}

/// Host stand-in for the buzzer, status LED, display and curtain servo.
///
/// Sweeps are handed to a dedicated task so a running sweep never holds up
/// the control loop or HTTP handlers. Queued sweeps run to completion in
/// the order they were commanded. Callers execute while holding the engine
/// lock, so queueing a sweep never waits.
#[derive(Clone)]
pub struct HostActuators {
    outputs: Arc<Mutex<OutputSnapshot>>,
    curtain_tx: mpsc::UnboundedSender<CurtainSweep>,
}

impl HostActuators {
    pub fn spawn(rest_deg: u8) -> Self {
        let outputs = Arc::new(Mutex::new(OutputSnapshot {
            servo_angle: rest_deg,
            ..OutputSnapshot::default()
        }));
        let (curtain_tx, curtain_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_curtain_task(outputs.clone(), curtain_rx));

        Self {
            outputs,
            curtain_tx,
        }
    }

    pub async fn snapshot(&self) -> OutputSnapshot {
        self.outputs.lock().await.clone()
    }

    pub async fn execute(&self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::SetAlarm(on) => {
                    info!("alarm {}", if on { "ON" } else { "OFF" });
                    self.outputs.lock().await.alarm_on = on;
                }
                EngineAction::SetStatusLight(on) => {
                    info!("status light {}", if on { "ON" } else { "OFF" });
                    self.outputs.lock().await.status_light_on = on;
                }
                EngineAction::Display(message) => {
                    let lines = message.lines();
                    debug!("display: {}", lines.join(" | "));
                    self.outputs.lock().await.display = lines;
                }
                EngineAction::ClearDisplay => {
                    debug!("display cleared");
                    self.outputs.lock().await.display.clear();
                }
                EngineAction::MoveCurtain(sweep) => {
                    if let Err(err) = self.curtain_tx.send(sweep) {
                        warn!("curtain task is gone, dropping sweep: {err}");
                    }
                }
            }
        }
    }
}

async fn run_curtain_task(
    outputs: Arc<Mutex<OutputSnapshot>>,
    mut sweeps: mpsc::UnboundedReceiver<CurtainSweep>,
) {
    while let Some(sweep) = sweeps.recv().await {
        info!(
            "curtain {} sweep {} -> {} ({} steps, {} ms)",
            sweep.command().as_str(),
            sweep.from_deg(),
            sweep.to_deg(),
            sweep.step_count(),
            sweep.duration_ms()
        );

        let step = Duration::from_millis(sweep.step_interval_ms());
        for angle in sweep.steps() {
            outputs.lock().await.servo_angle = angle;
            tokio::time::sleep(step).await;
        }

        info!("curtain {} sweep finished", sweep.command().as_str());
    }
}
