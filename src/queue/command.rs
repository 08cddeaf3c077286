use crate::error::CoreError;
use crate::util::Axis;
use chrono::{DateTime, Utc};

/// The request half of a mount command. Each variant is paired 1:1 with the
/// matching [`CommandOutcome`] variant; the Command Queue never has to
/// downcast an untyped payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    GoToAxisTarget(Axis, f64),
    GetPositionsDegrees,
    SetAxisPosition(Axis, f64),
    MoveAxisRate(Axis, f64),
    StopAxis(Axis),
    IsAxisFullStop(Axis),
    GetSteps,
    GetControllerVoltage,
    GetMotorCardVersion,
    SetPecEnabled(bool),
    SearchHome(Axis),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Positions([f64; 2]),
    Steps([i64; 2]),
    Voltage(f64),
    MotorCardVersion(String),
    FullStop(bool),
    Ack,
}

/// A command in flight or completed. `id = 0` means fire-and-forget: no
/// result is ever kept for it.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: u64,
    pub created_utc: DateTime<Utc>,
    pub payload: CommandKind,
    pub successful: bool,
    pub error: Option<CoreError>,
    pub result: Option<CommandOutcome>,
}

impl Command {
    pub fn new(id: u64, payload: CommandKind) -> Self {
        Self {
            id,
            created_utc: Utc::now(),
            payload,
            successful: false,
            error: None,
            result: None,
        }
    }

    pub fn wants_result(&self) -> bool {
        self.id > 0
    }

    pub(super) fn complete(&mut self, outcome: Result<CommandOutcome, CoreError>) {
        match outcome {
            Ok(result) => {
                self.successful = true;
                self.result = Some(result);
            }
            Err(error) => {
                self.successful = false;
                self.error = Some(error);
            }
        }
    }

    pub(super) fn fail_queue(&mut self, error: CoreError) {
        self.successful = false;
        self.error = Some(error);
    }
}
