use crate::config::Config;
use crate::coords::{az_alt_to_axes, ra_dec_to_axes, AlignmentModel, IdentityAlignmentModel};
use crate::error::{CoreError, CoreResult};
use crate::pec::PecEngine;
use crate::position::{MountPosition, PositionPipeline};
use crate::predictor::Predictor;
use crate::queue::{CommandKind, CommandQueue};
use crate::rates::TrackingMode;
use crate::slew::{SlewController, SlewEnv, SlewKind, SlewOutcome};
use crate::tracking::{GuideController, GuideDirection, TrackingEngine};
use crate::transport::{Backend, SimulatorBackend, SkyWatcherBackend};
use crate::util::{Axis, PierSide};
use crate::Snapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// A handle to a slew in progress, returned by the `slew_*`/`find_home`
/// family. Callers can `join` it to await completion or `abort` it to
/// cancel early.
pub struct SlewHandle {
    controller: Arc<SlewController>,
    join: tokio::task::JoinHandle<CoreResult<SlewOutcome>>,
}

impl SlewHandle {
    pub async fn join(self) -> CoreResult<SlewOutcome> {
        self.join
            .await
            .unwrap_or_else(|_| Err(CoreError::Cancelled))
    }

    pub async fn abort(&self) {
        self.controller.abort().await;
    }
}

/// The façade tying together Configuration, the Command Queue, Tracking,
/// the Slew Controller and the Position Pipeline into one connect/disconnect
/// lifecycle.
pub struct MountCore {
    config: Arc<RwLock<Config>>,
    snapshot_tx: watch::Sender<Snapshot>,
    snapshot_rx: watch::Receiver<Snapshot>,
    queue: Arc<CommandQueue>,
    tracking: Arc<Mutex<TrackingEngine>>,
    guide: Arc<GuideController>,
    pec: Arc<Mutex<PecEngine>>,
    alignment: Arc<dyn AlignmentModel>,
    position_rx: watch::Receiver<MountPosition>,
    position_pipeline: Arc<PositionPipeline>,
    position_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    position_cancel: Mutex<CancellationToken>,
    tracking_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    tracking_cancel: Mutex<CancellationToken>,
    snapshot_refresh_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    snapshot_refresh_cancel: Mutex<CancellationToken>,
    current_target: Arc<Mutex<Option<Predictor>>>,
    /// User-requested offset rates for the next RaDec slew's predictive
    /// target, e.g. to chase a non-sidereal object. Zero means "track the
    /// sky", the common case.
    target_rate: Mutex<(f64, f64)>,
    side_of_pier: Arc<Mutex<PierSide>>,
    active_slew: Arc<Mutex<Option<Arc<SlewController>>>>,
    connected: AtomicBool,
}

impl MountCore {
    pub fn new(config: Config) -> Self {
        let snapshot = Snapshot::from_settings(&config, chrono::Utc::now());
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);

        let queue = Arc::new(CommandQueue::new());
        let tracking = Arc::new(Mutex::new(TrackingEngine::default()));
        let guide = Arc::new(GuideController::new(tracking.clone()));
        let pec = Arc::new(Mutex::new(PecEngine::new(config.pec.pec_offset)));
        let alignment: Arc<dyn AlignmentModel> = Arc::new(IdentityAlignmentModel);

        let (position_pipeline, position_rx) =
            PositionPipeline::new(queue.clone(), alignment.clone(), tracking.clone());

        Self {
            config: Arc::new(RwLock::new(config)),
            snapshot_tx,
            snapshot_rx,
            queue,
            tracking,
            guide,
            pec,
            alignment,
            position_rx,
            position_pipeline: Arc::new(position_pipeline),
            position_task: Mutex::new(None),
            position_cancel: Mutex::new(CancellationToken::new()),
            tracking_task: Mutex::new(None),
            tracking_cancel: Mutex::new(CancellationToken::new()),
            snapshot_refresh_task: Mutex::new(None),
            snapshot_refresh_cancel: Mutex::new(CancellationToken::new()),
            current_target: Arc::new(Mutex::new(None)),
            target_rate: Mutex::new((0.0, 0.0)),
            side_of_pier: Arc::new(Mutex::new(PierSide::Unknown)),
            active_slew: Arc::new(Mutex::new(None)),
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }

    /// Open the configured back-end and start the Command Queue worker and
    /// Position Pipeline task.
    pub async fn connect(&self) -> CoreResult<()> {
        if self.is_connected() {
            return Err(CoreError::invalid_state("already connected"));
        }

        let config = self.config.read().await;
        let backend: Box<dyn Backend> = match config.mount_family.family {
            crate::config::MountFamily::Simulator => {
                Box::new(SimulatorBackend::new(self.snapshot_rx.borrow().clone()))
            }
            crate::config::MountFamily::SkyWatcher => Box::new(SkyWatcherBackend::open(&config.com)?),
        };
        drop(config);

        self.queue.start(backend);

        let position_cancel = CancellationToken::new();
        *self.position_cancel.lock().await = position_cancel.clone();
        let pipeline = self.position_pipeline.clone();
        let snapshot_rx = self.snapshot_rx.clone();
        let handle = tokio::spawn(async move { pipeline.run(snapshot_rx, position_cancel).await });
        *self.position_task.lock().await = Some(handle);

        let tracking_cancel = CancellationToken::new();
        *self.tracking_cancel.lock().await = tracking_cancel.clone();
        let tracking_handle = tokio::spawn(tracking_loop(
            self.tracking.clone(),
            self.pec.clone(),
            self.queue.clone(),
            self.position_rx.clone(),
            self.current_target.clone(),
            self.snapshot_rx.clone(),
            tracking_cancel,
        ));
        *self.tracking_task.lock().await = Some(tracking_handle);

        let snapshot_refresh_cancel = CancellationToken::new();
        *self.snapshot_refresh_cancel.lock().await = snapshot_refresh_cancel.clone();
        let snapshot_refresh_handle = tokio::spawn(snapshot_refresh_loop(
            self.config.clone(),
            self.snapshot_tx.clone(),
            self.snapshot_rx.clone(),
            snapshot_refresh_cancel,
        ));
        *self.snapshot_refresh_task.lock().await = Some(snapshot_refresh_handle);

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the Position Pipeline task, tracking loop and Command Queue
    /// worker. Idempotent.
    pub async fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }

        self.position_cancel.lock().await.cancel();
        if let Some(handle) = self.position_task.lock().await.take() {
            let _ = handle.await;
        }
        self.tracking_cancel.lock().await.cancel();
        if let Some(handle) = self.tracking_task.lock().await.take() {
            let _ = handle.await;
        }
        self.snapshot_refresh_cancel.lock().await.cancel();
        if let Some(handle) = self.snapshot_refresh_task.lock().await.take() {
            let _ = handle.await;
        }
        self.queue.stop();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Immediately stop every axis and disable tracking, bypassing the
    /// Command Queue's FIFO ordering for anything already enqueued.
    pub async fn emergency_stop(&self) -> CoreResult<()> {
        if let Some(slew) = self.active_slew.lock().await.take() {
            slew.abort().await;
        }
        self.tracking.lock().await.set_tracking(false, TrackingMode::Off, false);
        for axis in Axis::ALL {
            let id = self.queue.next_id();
            self.queue.enqueue(id, CommandKind::StopAxis(axis))?;
        }
        Ok(())
    }

    pub fn position(&self) -> MountPosition {
        *self.position_rx.borrow()
    }

    pub fn ra_hours(&self) -> f64 {
        self.position().ra_hours
    }

    pub fn dec_deg(&self) -> f64 {
        self.position().dec_deg
    }

    pub fn az_deg(&self) -> f64 {
        self.position().az_deg
    }

    pub fn alt_deg(&self) -> f64 {
        self.position().alt_deg
    }

    pub async fn side_of_pier(&self) -> PierSide {
        *self.side_of_pier.lock().await
    }

    /// The Snapshot the façade and its background tasks are currently
    /// reading from, refreshed periodically by `snapshot_refresh_loop`.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Record which side of the mount the telescope is on, e.g. after a
    /// meridian-flipping GoTo completes or a manual sync establishes it.
    pub async fn set_side_of_pier(&self, side: PierSide) {
        *self.side_of_pier.lock().await = side;
    }

    pub async fn is_slewing(&self) -> bool {
        self.active_slew.lock().await.is_some()
    }

    pub fn at_park(&self, snapshot: &Snapshot) -> bool {
        within_precision(self.position().mount_axes, snapshot.park_axes, snapshot.goto_precision_deg)
    }

    pub fn at_home(&self, snapshot: &Snapshot) -> bool {
        within_precision(self.position().mount_axes, snapshot.home_axes, snapshot.goto_precision_deg)
    }

    pub async fn tracking_mode(&self) -> TrackingMode {
        self.tracking.lock().await.mode
    }

    pub async fn set_tracking(&self, on: bool, mode: TrackingMode, is_altaz_mount: bool) {
        self.tracking.lock().await.set_tracking(on, mode, is_altaz_mount);
    }

    pub async fn set_move_axis_rate(&self, axis: Axis, rate_deg_per_s: f64) {
        self.tracking.lock().await.set_move_axis_rate(axis, rate_deg_per_s);
    }

    /// Set the RA/Dec drift rate (deg/s on each axis's own scale) the next
    /// `slew_ra_dec` seeds its predictive target with, for chasing a
    /// non-sidereal object rather than a fixed sky coordinate. Zero (the
    /// default) tracks the sky.
    pub async fn set_target_rate(&self, rate_ra: f64, rate_dec: f64) {
        *self.target_rate.lock().await = (rate_ra, rate_dec);
    }

    /// Apply a guide pulse; Declination is routed through a short GoTo
    /// instead of a rate offset when `dec_pulse_to_goto` is set.
    pub async fn pulse_guide(&self, axis: Axis, direction: GuideDirection, duration_ms: u32) -> CoreResult<()> {
        let snapshot = self.snapshot_rx.borrow().clone();

        if axis == Axis::Secondary && snapshot.dec_pulse_to_goto {
            let current = self.position().mount_axes[1];
            let nudge_deg = snapshot.guide_rate_offset_y * (duration_ms as f64 / 1000.0);
            let target = match direction {
                GuideDirection::Positive => current + nudge_deg,
                GuideDirection::Negative => current - nudge_deg,
            };
            let id = self.queue.next_id();
            self.queue.enqueue(id, CommandKind::GoToAxisTarget(Axis::Secondary, target))?;
            let command = self.queue.get_result(id).await;
            return if command.successful {
                Ok(())
            } else {
                Err(command.error.unwrap_or_else(|| CoreError::queue_failed("dec pulse goto failed")))
            };
        }

        self.guide.pulse_guide(axis, direction, duration_ms, &snapshot).await
    }

    /// Begin an RA/Dec GoTo; returns immediately with a handle.
    pub async fn slew_ra_dec(&self, ra_hours: f64, dec_deg: f64) -> CoreResult<SlewHandle> {
        self.start_slew(SlewKind::GoToRaDec, ra_hours, dec_deg).await
    }

    pub async fn slew_alt_az(&self, az_deg: f64, alt_deg: f64) -> CoreResult<SlewHandle> {
        self.start_slew(SlewKind::GoToAltAz, az_deg, alt_deg).await
    }

    pub async fn slew_to_park(&self) -> CoreResult<SlewHandle> {
        self.start_slew(SlewKind::Park, 0.0, 0.0).await
    }

    pub async fn find_home(&self, axis: Axis) -> CoreResult<SlewHandle> {
        self.start_slew(SlewKind::FindHome { axis }, 0.0, 0.0).await
    }

    /// A slew issued while another is `Moving` preempts it: the first is
    /// cancelled and awaited to termination before the second's Setup
    /// begins.
    async fn start_slew(&self, kind: SlewKind, a: f64, b: f64) -> CoreResult<SlewHandle> {
        if let Some(previous) = self.active_slew.lock().await.take() {
            previous.abort().await;
        }

        let snapshot = self.snapshot_rx.borrow().clone();
        let position = self.position();

        let predictor = if kind == SlewKind::GoToRaDec {
            let (rate_ra, rate_dec) = *self.target_rate.lock().await;
            Predictor::new(a, b, rate_ra, rate_dec, chrono::Utc::now())
        } else {
            Predictor::stationary(a, b, chrono::Utc::now())
        };

        let env = SlewEnv {
            tracking: self.tracking.clone(),
            current_target: self.current_target.clone(),
            side_of_pier: self.side_of_pier.clone(),
        };
        let controller = Arc::new(SlewController::new(self.queue.clone(), predictor, kind, env));

        *self.active_slew.lock().await = Some(controller.clone());
        let current_side = *self.side_of_pier.lock().await;

        let active_slot = self.active_slew.clone();
        let join = tokio::spawn({
            let controller = controller.clone();
            async move {
                let result = controller.run(&snapshot, position, current_side).await;
                active_slot.lock().await.take();
                result
            }
        });

        Ok(SlewHandle { controller, join })
    }

    pub async fn abort_slew(&self) {
        if let Some(slew) = self.active_slew.lock().await.clone() {
            slew.abort().await;
        }
    }

    /// Declare the current hardware position as `ra_hours`/`dec_deg`
    /// without moving. The pointing-correction model, if any, is what
    /// actually absorbs the discrepancy; this call is the point at which
    /// it would be consulted.
    pub async fn sync_ra_dec(&self, ra_hours: f64, dec_deg: f64) -> CoreResult<()> {
        let snapshot = self.snapshot_rx.borrow().clone();
        let axes = ra_dec_to_axes(ra_hours, dec_deg, &snapshot);
        self.resync_axes(axes).await
    }

    pub async fn sync_alt_az(&self, az_deg: f64, alt_deg: f64) -> CoreResult<()> {
        let snapshot = self.snapshot_rx.borrow().clone();
        let axes = az_alt_to_axes(az_deg, alt_deg, &snapshot);
        self.resync_axes(axes).await
    }

    /// Declare the mount to be at `park_axes`/`home_axes` without motion,
    /// used after a manual park or a successful home search.
    pub async fn resync_axes(&self, mount_axes: [f64; 2]) -> CoreResult<()> {
        for axis in Axis::ALL {
            let id = self.queue.next_id();
            self.queue
                .enqueue(id, CommandKind::SetAxisPosition(axis, mount_axes[axis.index()]))?;
            let command = self.queue.get_result(id).await;
            if !command.successful {
                return Err(command.error.unwrap_or_else(|| CoreError::queue_failed("resync failed")));
            }
        }
        Ok(())
    }

    pub fn alignment_model(&self) -> Arc<dyn AlignmentModel> {
        self.alignment.clone()
    }

    pub async fn load_pec_worm(&self, contents: &str) -> CoreResult<()> {
        let snapshot = self.snapshot_rx.borrow().clone();
        self.pec.lock().await.load_worm(
            contents,
            snapshot.steps_per_rev[0],
            snapshot.pec_bin_steps,
            snapshot.pec_bin_count,
        )
    }
}

fn within_precision(actual: [f64; 2], target: [f64; 2], precision_deg: f64) -> bool {
    (actual[0] - target[0]).abs() <= precision_deg && (actual[1] - target[1]).abs() <= precision_deg
}

/// Continuously applies the Tracking Engine's commanded rate to both axes.
/// Alt/Az tracking additionally re-derives its rate vector from the current
/// target every `alt_az_tracking_update_interval_ms` by differencing the
/// projected position a tick ahead against now.
async fn tracking_loop(
    tracking: Arc<Mutex<TrackingEngine>>,
    pec: Arc<Mutex<PecEngine>>,
    queue: Arc<CommandQueue>,
    position_rx: watch::Receiver<MountPosition>,
    current_target: Arc<Mutex<Option<Predictor>>>,
    snapshot_rx: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
) {
    loop {
        let snapshot = snapshot_rx.borrow().clone();
        let interval = std::time::Duration::from_millis(snapshot.alt_az_tracking_update_interval_ms);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return,
        }

        let engine = tracking.lock().await;
        if !engine.mode.is_tracking() {
            continue;
        }
        let mode = engine.mode;
        drop(engine);

        let altaz_rate = if mode == TrackingMode::AltAz {
            altaz_rate_override(&current_target, &snapshot).await
        } else {
            None
        };

        let ra_steps = position_rx.borrow().steps[0];
        let pec_engine = pec.lock().await.clone();
        let engine = tracking.lock().await;

        for axis in Axis::ALL {
            let rate = engine.commanded_rate(axis, &snapshot, &pec_engine, ra_steps, altaz_rate, false);
            let id = queue.next_id();
            let _ = queue.enqueue(id, CommandKind::MoveAxisRate(axis, rate));
        }
    }
}

/// Recomputes Local Sidereal Time from wall-clock time and republishes the
/// Snapshot every `display_interval_ms`. Every pure algorithm downstream
/// (position derivation, flip detection, AltAz rate projection) reads LST
/// off a Snapshot rather than the clock directly, so without this loop RA
/// and AltAz tracking rates silently drift as wall-clock time advances past
/// `connect()`.
async fn snapshot_refresh_loop(
    config: Arc<RwLock<Config>>,
    snapshot_tx: watch::Sender<Snapshot>,
    snapshot_rx: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
) {
    loop {
        let interval = std::time::Duration::from_millis(snapshot_rx.borrow().display_interval_ms);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return,
        }

        let config = config.read().await.clone();
        let fresh = Snapshot::from_settings(&config, chrono::Utc::now());
        let _ = snapshot_tx.send(fresh);
    }
}

/// Sidereal seconds per solar second, used to project Local Sidereal Time
/// forward without waiting on the clock.
const SIDEREAL_RATIO: f64 = 1.00273790935;

/// Finite-difference the Alt/Az rate a short step ahead of now, using the
/// projected target as the reference. Alt/Az axes depend on Hour Angle,
/// i.e. on LST, so even a sidereal-fixed target
/// (predictor rate zero) sweeps through Alt/Az as LST advances; the
/// lookahead sample needs its own, later LST rather than reusing the
/// current tick's.
async fn altaz_rate_override(
    current_target: &Arc<Mutex<Option<Predictor>>>,
    snapshot: &Snapshot,
) -> Option<f64> {
    let target = (*current_target.lock().await)?;
    let now = chrono::Utc::now();
    let lookahead_s = 1.0;
    let (ra0, dec0) = target.get_ra_dec_at(now);
    let (ra1, dec1) = target.get_ra_dec_at(now + chrono::Duration::seconds(lookahead_s as i64));

    let lst1_hours = crate::astro_math::modulo(
        snapshot.local_sidereal_time_hours + (lookahead_s * SIDEREAL_RATIO) / 3600.0,
        24.0,
    );
    let snapshot1 = snapshot.with_local_sidereal_time(lst1_hours);

    let axes0 = crate::coords::ra_dec_to_axes(ra0, dec0, snapshot);
    let axes1 = crate::coords::ra_dec_to_axes(ra1, dec1, &snapshot1);
    Some(axes1[0] - axes0[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_disconnect_round_trips() {
        let core = MountCore::new(Config::default());
        core.connect().await.unwrap();
        assert!(core.is_connected());
        core.disconnect().await;
        assert!(!core.is_connected());
    }

    #[tokio::test]
    async fn double_connect_is_rejected() {
        let core = MountCore::new(Config::default());
        core.connect().await.unwrap();
        assert!(core.connect().await.is_err());
        core.disconnect().await;
    }

    #[tokio::test]
    async fn slew_to_park_reports_completed() {
        let core = MountCore::new(Config::default());
        core.connect().await.unwrap();

        let handle = core.slew_to_park().await.unwrap();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome, SlewOutcome::Completed);

        core.disconnect().await;
    }

    #[tokio::test]
    async fn concurrent_slew_preempts_the_first() {
        let core = MountCore::new(Config::default());
        core.connect().await.unwrap();

        let first = core.slew_to_park().await.unwrap();
        let second = core.slew_to_park().await.unwrap();
        let outcome = second.join().await.unwrap();
        assert_eq!(outcome, SlewOutcome::Completed);

        // The first handle's own join either observed the cancellation or
        // lost the race to the (near-instant) park target; both are valid
        // preemption outcomes, unlike the old reject-on-concurrent-slew
        // behaviour this replaces.
        let _ = first.join().await;

        core.disconnect().await;
    }
}
