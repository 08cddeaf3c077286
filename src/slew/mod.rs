//! Three-phase cancellable slew state machine: Setup → Movement →
//! Completion, with predictive re-targeting while chasing a moving target
//! and a bounded cancellation window.

mod completion;
mod movement;
mod setup;
mod state;

pub use state::SlewState;

use crate::error::CoreResult;
use crate::position::MountPosition;
use crate::predictor::Predictor;
use crate::queue::{CommandKind, CommandQueue};
use crate::tracking::TrackingEngine;
use crate::util::{AbortResult, Axis, PierSide};
use crate::Snapshot;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Feed-forward damping applied to the positional error on each precision
/// pass while chasing a moving target; fixed constants rather than a
/// configurable gain (see DESIGN.md for the rationale).
const DAMPING_X: f64 = 0.25;
const DAMPING_Y: f64 = 0.10;

const CANCEL_POLL: Duration = Duration::from_millis(50);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// What a slew is ultimately trying to achieve; determines the completion
/// contract run after Movement converges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlewKind {
    GoToRaDec,
    GoToAltAz,
    Park,
    FindHome { axis: Axis },
    /// Continuous hand-paddle motion; Setup/Movement treat the mount as
    /// already at target since the rate is driven by the Tracking Engine's
    /// MoveAxis override rather than a discrete GoTo.
    Handpad,
    MoveAxis,
    Settle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlewOutcome {
    Completed,
    Cancelled,
}

/// State shared with the facade so Setup/Completion can disable and restore
/// tracking, reseed the predictive target, and record the resolved side of
/// pier.
pub struct SlewEnv {
    pub tracking: Arc<Mutex<TrackingEngine>>,
    pub current_target: Arc<Mutex<Option<Predictor>>>,
    pub side_of_pier: Arc<Mutex<PierSide>>,
}

/// Drives one end-to-end slew. Construct one per slew request; it is not
/// reused once `run` returns.
pub struct SlewController {
    queue: Arc<CommandQueue>,
    predictor: Predictor,
    kind: SlewKind,
    env: SlewEnv,
    token: CancellationToken,
    state: AtomicU8,
}

impl SlewController {
    pub fn new(queue: Arc<CommandQueue>, predictor: Predictor, kind: SlewKind, env: SlewEnv) -> Self {
        Self {
            queue,
            predictor,
            kind,
            env,
            token: CancellationToken::new(),
            state: AtomicU8::new(SlewState::Idle as u8),
        }
    }

    pub fn state(&self) -> SlewState {
        SlewState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SlewState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// A cloneable handle callers can cancel from another task without
    /// holding a reference to the controller itself.
    pub fn cancellation_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel and wait up to `CANCEL_TIMEOUT` for the Movement loop to
    /// notice; force-stops every axis directly if it does not.
    pub async fn abort(&self) {
        self.token.cancel();
        if self.state() != SlewState::Idle {
            self.set_state(SlewState::Cancelling);
        }
        let deadline = tokio::time::Instant::now() + CANCEL_TIMEOUT;
        while self.state() != SlewState::Idle && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(CANCEL_POLL).await;
        }
        if self.state() != SlewState::Idle {
            for axis in Axis::ALL {
                let id = self.queue.next_id();
                let _ = self.queue.enqueue(id, CommandKind::StopAxis(axis));
            }
            self.set_state(SlewState::Idle);
        }
    }

    /// Run the slew to completion or cancellation.
    pub async fn run(
        &self,
        snapshot: &Snapshot,
        position: MountPosition,
        current_side: PierSide,
    ) -> CoreResult<SlewOutcome> {
        self.set_state(SlewState::Setup);
        let plan = setup::plan(self.kind, self.predictor, current_side, snapshot, &position, &self.env).await?;

        self.set_state(SlewState::Moving);
        let movement = movement::run(
            &self.queue,
            &self.predictor,
            self.kind,
            plan.target_axes,
            snapshot,
            &self.token,
            DAMPING_X,
            DAMPING_Y,
        )
        .await?;

        match movement {
            AbortResult::Aborted(()) => {
                self.set_state(SlewState::Cancelling);
                for axis in Axis::ALL {
                    let id = self.queue.next_id();
                    let _ = self.queue.enqueue(id, CommandKind::StopAxis(axis));
                }
                self.set_state(SlewState::Idle);
                Ok(SlewOutcome::Cancelled)
            }
            AbortResult::Completed(()) => {
                self.set_state(SlewState::Completing);
                completion::run(&self.queue, self.kind, snapshot, &self.env, &plan).await?;
                self.set_state(SlewState::Idle);
                Ok(SlewOutcome::Completed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatorBackend;
    use chrono::Utc;

    fn test_env() -> SlewEnv {
        SlewEnv {
            tracking: Arc::new(Mutex::new(TrackingEngine::default())),
            current_target: Arc::new(Mutex::new(None)),
            side_of_pier: Arc::new(Mutex::new(PierSide::Unknown)),
        }
    }

    #[tokio::test]
    async fn slew_to_park_completes_and_returns_idle() {
        let snapshot = Snapshot::default_for_tests();
        let queue = Arc::new(CommandQueue::new());
        queue.start(Box::new(SimulatorBackend::new(snapshot.clone())));

        let predictor = Predictor::stationary(0.0, 0.0, Utc::now());
        let controller = SlewController::new(queue.clone(), predictor, SlewKind::Park, test_env());

        let outcome = controller
            .run(&snapshot, MountPosition::default(), PierSide::Unknown)
            .await
            .unwrap();
        assert_eq!(outcome, SlewOutcome::Completed);
        assert_eq!(controller.state(), SlewState::Idle);

        queue.stop();
    }

    #[tokio::test]
    async fn aborting_an_idle_slew_is_a_no_op() {
        let snapshot = Snapshot::default_for_tests();
        let queue = Arc::new(CommandQueue::new());
        queue.start(Box::new(SimulatorBackend::new(snapshot.clone())));

        let predictor = Predictor::stationary(0.0, 0.0, Utc::now());
        let controller = SlewController::new(queue.clone(), predictor, SlewKind::Park, test_env());
        controller.abort().await;
        assert_eq!(controller.state(), SlewState::Idle);

        queue.stop();
    }
}
