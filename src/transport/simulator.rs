use crate::error::CoreResult;
use crate::queue::{CommandKind, CommandOutcome};
use crate::transport::Backend;
use crate::util::Axis;
use crate::Snapshot;
use std::time::Instant;

/// In-process message-queue back-end with the same command semantics as
/// the real hardware but no wire protocol.
pub struct SimulatorBackend {
    positions_deg: [f64; 2],
    rates_deg_per_s: [f64; 2],
    goto_targets: [Option<f64>; 2],
    last_tick: Instant,
    factor_step: [f64; 2],
    goto_speed_deg_per_s: f64,
}

impl SimulatorBackend {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            positions_deg: [0.0, 0.0],
            rates_deg_per_s: [0.0, 0.0],
            goto_targets: [None, None],
            last_tick: Instant::now(),
            factor_step: snapshot.factor_step,
            goto_speed_deg_per_s: snapshot.slew_speeds[6].max(0.1), // "32x" tier
        }
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;

        for axis in Axis::ALL {
            let i = axis.index();
            if let Some(target) = self.goto_targets[i] {
                let delta = target - self.positions_deg[i];
                let step = self.goto_speed_deg_per_s * dt;
                if delta.abs() <= step {
                    self.positions_deg[i] = target;
                    self.goto_targets[i] = None;
                } else {
                    self.positions_deg[i] += step * delta.signum();
                }
            } else {
                self.positions_deg[i] += self.rates_deg_per_s[i] * dt;
            }
        }
    }

    fn is_full_stop(&self, axis: Axis) -> bool {
        let i = axis.index();
        self.goto_targets[i].is_none() && self.rates_deg_per_s[i] == 0.0
    }
}

impl Backend for SimulatorBackend {
    fn execute(&mut self, payload: &CommandKind) -> CoreResult<CommandOutcome> {
        self.advance();

        Ok(match *payload {
            CommandKind::GoToAxisTarget(axis, degrees) => {
                self.goto_targets[axis.index()] = Some(degrees);
                self.rates_deg_per_s[axis.index()] = 0.0;
                CommandOutcome::Ack
            }
            CommandKind::GetPositionsDegrees => CommandOutcome::Positions(self.positions_deg),
            CommandKind::SetAxisPosition(axis, degrees) => {
                self.positions_deg[axis.index()] = degrees;
                self.goto_targets[axis.index()] = None;
                self.rates_deg_per_s[axis.index()] = 0.0;
                CommandOutcome::Ack
            }
            CommandKind::MoveAxisRate(axis, rate) => {
                self.goto_targets[axis.index()] = None;
                self.rates_deg_per_s[axis.index()] = rate;
                CommandOutcome::Ack
            }
            CommandKind::StopAxis(axis) => {
                self.goto_targets[axis.index()] = None;
                self.rates_deg_per_s[axis.index()] = 0.0;
                CommandOutcome::Ack
            }
            CommandKind::IsAxisFullStop(axis) => CommandOutcome::FullStop(self.is_full_stop(axis)),
            CommandKind::GetSteps => {
                let steps = [
                    (self.positions_deg[0] * self.factor_step[0]).round() as i64,
                    (self.positions_deg[1] * self.factor_step[1]).round() as i64,
                ];
                CommandOutcome::Steps(steps)
            }
            CommandKind::GetControllerVoltage => CommandOutcome::Voltage(12.0),
            CommandKind::GetMotorCardVersion => {
                CommandOutcome::MotorCardVersion("SIMULATOR-1.0".to_string())
            }
            CommandKind::SetPecEnabled(_) => CommandOutcome::Ack,
            CommandKind::SearchHome(axis) => {
                self.positions_deg[axis.index()] = 0.0;
                CommandOutcome::Ack
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_reaches_target_after_enough_time() {
        let mut backend = SimulatorBackend::new(Snapshot::default_for_tests());
        backend
            .execute(&CommandKind::GoToAxisTarget(Axis::Primary, 10.0))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        // Repeated small advances converge to the target even if not
        // instantly: the simulated speed is generous relative to 10 degrees.
        for _ in 0..50 {
            backend.execute(&CommandKind::GetPositionsDegrees).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let CommandOutcome::FullStop(stopped) = backend
            .execute(&CommandKind::IsAxisFullStop(Axis::Primary))
            .unwrap()
        else {
            unreachable!()
        };
        assert!(stopped);
    }

    #[test]
    fn set_axis_position_is_immediate() {
        let mut backend = SimulatorBackend::new(Snapshot::default_for_tests());
        backend
            .execute(&CommandKind::SetAxisPosition(Axis::Secondary, 42.0))
            .unwrap();
        let CommandOutcome::Positions(positions) =
            backend.execute(&CommandKind::GetPositionsDegrees).unwrap()
        else {
            unreachable!()
        };
        assert!((positions[1] - 42.0).abs() < 1e-6);
    }
}
