use crate::coords::{az_alt_to_axes, is_flip_required, ra_dec_to_axes};
use crate::error::{CoreError, CoreResult};
use crate::position::MountPosition;
use crate::predictor::Predictor;
use crate::rates::TrackingMode;
use crate::slew::{SlewEnv, SlewKind};
use crate::util::PierSide;
use crate::Snapshot;

pub(super) struct SetupPlan {
    pub target_axes: [f64; 2],
    pub flip_required: bool,
    pub initial_ra: f64,
    pub initial_dec: f64,
    pub was_tracking: bool,
    pub was_tracking_mode: TrackingMode,
}

/// Pre-slew validation and target-axis computation. Rejects targets
/// outside the configured hardware envelope before any
/// motion starts, captures the state Completion needs to restore, disables
/// tracking so Movement has the axes to itself, and (for RaDec) seeds the
/// predictive target used by both Movement's feed-forward re-aim and the
/// tracking loop's AltAz rate projection.
pub(super) async fn plan(
    kind: SlewKind,
    predictor: Predictor,
    current_side: PierSide,
    snapshot: &Snapshot,
    position: &MountPosition,
    env: &SlewEnv,
) -> CoreResult<SetupPlan> {
    let target_axes = match kind {
        SlewKind::GoToRaDec => {
            let (ra, dec) = predictor.target();
            ra_dec_to_axes(ra, dec, snapshot)
        }
        SlewKind::GoToAltAz => {
            let (az, alt) = predictor.target();
            az_alt_to_axes(az, alt, snapshot)
        }
        SlewKind::Park => snapshot.park_axes,
        SlewKind::FindHome { .. } => snapshot.home_axes,
        // Continuous-rate operations: Movement has nothing to GoTo, so
        // treat the mount as already at target and let the Tracking
        // Engine's MoveAxis/Handpad rate override drive the axes.
        SlewKind::Handpad | SlewKind::MoveAxis | SlewKind::Settle => position.mount_axes,
    };

    if target_axes[1] > snapshot.axis_upper_limit_y_deg || target_axes[1] < snapshot.axis_lower_limit_y_deg {
        return Err(CoreError::LimitReached(format!(
            "target axis y={:.3} outside [{:.3}, {:.3}]",
            target_axes[1], snapshot.axis_lower_limit_y_deg, snapshot.axis_upper_limit_y_deg
        )));
    }

    let flip_required =
        matches!(kind, SlewKind::GoToRaDec) && is_flip_required(predictor.target(), current_side, snapshot);

    let initial_ra = position.ra_hours;
    let initial_dec = position.dec_deg;

    let (was_tracking, was_tracking_mode) = {
        let mut tracking = env.tracking.lock().await;
        let was_tracking_mode = tracking.mode;
        let was_tracking = was_tracking_mode.is_tracking();
        tracking.set_tracking(false, was_tracking_mode, false);
        (was_tracking, was_tracking_mode)
    };

    if matches!(kind, SlewKind::GoToRaDec) {
        *env.current_target.lock().await = Some(predictor);
    }

    Ok(SetupPlan {
        target_axes,
        flip_required,
        initial_ra,
        initial_dec,
        was_tracking,
        was_tracking_mode,
    })
}
