use crate::coords::{axes_to_alt_az, axes_to_ra_dec, mount_to_app, AlignmentModel};
use crate::error::{CoreError, CoreResult};
use crate::queue::{CommandKind, CommandOutcome, CommandQueue};
use crate::tracking::TrackingEngine;
use crate::Snapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

/// The fully-derived mount position published on every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountPosition {
    pub mount_axes: [f64; 2],
    pub app_axes: [f64; 2],
    pub ra_hours: f64,
    pub dec_deg: f64,
    pub az_deg: f64,
    pub alt_deg: f64,
    pub steps: [i64; 2],
}

impl Default for MountPosition {
    fn default() -> Self {
        Self {
            mount_axes: [0.0, 0.0],
            app_axes: [0.0, 0.0],
            ra_hours: 0.0,
            dec_deg: 0.0,
            az_deg: 0.0,
            alt_deg: 0.0,
            steps: [0, 0],
        }
    }
}

const STEP_COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Periodic tick reading raw steps off the Command Queue, correcting them
/// through the alignment model, deriving Alt/Az and RA/Dec, and checking
/// axis limits. Runs on its own task; reads
/// are coalesced so a burst of callers never drives more than one
/// `GetSteps` per `STEP_COALESCE_WINDOW`.
pub struct PositionPipeline {
    queue: Arc<CommandQueue>,
    alignment: Arc<dyn AlignmentModel>,
    tracking: Arc<Mutex<TrackingEngine>>,
    last_fetch: Mutex<Option<(Instant, [i64; 2])>>,
    tx: watch::Sender<MountPosition>,
}

impl PositionPipeline {
    pub fn new(
        queue: Arc<CommandQueue>,
        alignment: Arc<dyn AlignmentModel>,
        tracking: Arc<Mutex<TrackingEngine>>,
    ) -> (Self, watch::Receiver<MountPosition>) {
        let (tx, rx) = watch::channel(MountPosition::default());
        (
            Self {
                queue,
                alignment,
                tracking,
                last_fetch: Mutex::new(None),
                tx,
            },
            rx,
        )
    }

    /// Runs until `cancel` fires, ticking every
    /// `snapshot.display_interval_ms`. Errors (including limit breaches)
    /// are logged and do not stop the loop; a stuck hardware link should
    /// surface through `CommandQueue::get_result`'s own timeout instead.
    pub async fn run(&self, snapshot_rx: watch::Receiver<Snapshot>, cancel: tokio_util::sync::CancellationToken) {
        loop {
            let interval = Duration::from_millis(snapshot_rx.borrow().display_interval_ms);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return,
            }

            let snapshot = snapshot_rx.borrow().clone();
            match self.tick(&snapshot).await {
                Ok(position) => {
                    let _ = self.tx.send(position);
                }
                Err(error) => {
                    tracing::warn!(%error, "position tick failed");
                }
            }
        }
    }

    /// One pass of the pipeline: fetch steps (coalesced), convert to
    /// degrees, unsync, derive Alt/Az + RA/Dec, check limits.
    pub async fn tick(&self, snapshot: &Snapshot) -> CoreResult<MountPosition> {
        let steps = self.fetch_steps_coalesced().await?;

        let raw_axes = [
            steps[0] as f64 / snapshot.factor_step[0],
            steps[1] as f64 / snapshot.factor_step[1],
        ];
        let mount_axes = self.alignment.unsync(raw_axes);

        self.check_limits(mount_axes, snapshot).await?;

        let app_axes = mount_to_app(mount_axes, snapshot);
        let (az_deg, alt_deg) = axes_to_alt_az(mount_axes, snapshot);
        let (ra_hours, dec_deg) = axes_to_ra_dec(mount_axes, snapshot);

        Ok(MountPosition {
            mount_axes,
            app_axes,
            ra_hours,
            dec_deg,
            az_deg,
            alt_deg,
            steps,
        })
    }

    async fn fetch_steps_coalesced(&self) -> CoreResult<[i64; 2]> {
        {
            let cache = self.last_fetch.lock().await;
            if let Some((at, steps)) = *cache {
                if at.elapsed() < STEP_COALESCE_WINDOW {
                    return Ok(steps);
                }
            }
        }

        let id = self.queue.next_id();
        self.queue.enqueue(id, CommandKind::GetSteps)?;
        let command = self.queue.get_result(id).await;
        let steps = match command.result {
            Some(CommandOutcome::Steps(s)) if command.successful => s,
            _ => return Err(command.error.unwrap_or_else(|| CoreError::queue_failed("get steps failed"))),
        };

        *self.last_fetch.lock().await = Some((Instant::now(), steps));
        Ok(steps)
    }

    /// Axis-limit enforcement: a breach disables tracking when
    /// `hz_limit_tracking` is set, then always surfaces as `LimitReached`.
    async fn check_limits(&self, mount_axes: [f64; 2], snapshot: &Snapshot) -> CoreResult<()> {
        let breached = mount_axes[0].abs() > snapshot.axis_limit_x_deg
            || mount_axes[1] > snapshot.axis_upper_limit_y_deg
            || mount_axes[1] < snapshot.axis_lower_limit_y_deg;

        if !breached {
            return Ok(());
        }

        if snapshot.hz_limit_tracking {
            let mut tracking = self.tracking.lock().await;
            tracking.set_tracking(false, tracking.mode, false);
        }

        Err(CoreError::LimitReached(format!(
            "axis position {mount_axes:?} outside configured envelope"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::IdentityAlignmentModel;
    use crate::rates::TrackingMode;
    use crate::transport::SimulatorBackend;

    fn harness() -> (Arc<CommandQueue>, PositionPipeline, watch::Receiver<MountPosition>) {
        let snapshot = Snapshot::default_for_tests();
        let queue = Arc::new(CommandQueue::new());
        queue.start(Box::new(SimulatorBackend::new(snapshot)));
        let tracking = Arc::new(Mutex::new(TrackingEngine::default()));
        let (pipeline, rx) = PositionPipeline::new(queue.clone(), Arc::new(IdentityAlignmentModel), tracking);
        (queue, pipeline, rx)
    }

    #[tokio::test]
    async fn tick_derives_position_at_origin() {
        let (queue, pipeline, _rx) = harness();
        let snapshot = Snapshot::default_for_tests();
        let position = pipeline.tick(&snapshot).await.unwrap();
        assert_eq!(position.steps, [0, 0]);
        queue.stop();
    }

    #[tokio::test]
    async fn limit_breach_disables_tracking_and_errors() {
        let (queue, pipeline, _rx) = harness();
        let mut snapshot = Snapshot::default_for_tests();
        snapshot.axis_limit_x_deg = 0.0; // anything nonzero in x now breaches
        snapshot.hz_limit_tracking = true;

        {
            let mut tracking = pipeline.tracking.lock().await;
            tracking.set_tracking(true, TrackingMode::Sidereal, false);
        }

        let id = queue.next_id();
        queue.enqueue(id, CommandKind::SetAxisPosition(crate::util::Axis::Primary, 5.0)).unwrap();
        queue.get_result(id).await;

        let err = pipeline.tick(&snapshot).await;
        assert!(err.is_err());
        assert_eq!(pipeline.tracking.lock().await.mode, TrackingMode::Off);
        queue.stop();
    }
}
