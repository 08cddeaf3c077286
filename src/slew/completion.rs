use crate::config::AlignmentMode;
use crate::coords::{axes_to_ra_dec, resolved_side_of_pier};
use crate::error::CoreResult;
use crate::predictor::Predictor;
use crate::queue::{CommandKind, CommandOutcome, CommandQueue};
use crate::rates::TrackingMode;
use crate::slew::{setup::SetupPlan, SlewEnv, SlewKind};
use crate::Snapshot;

/// Slew-kind-specific completion contract run once Movement converges. In
/// every case the slew ends by publishing `slew_state = None` (the caller
/// does this once `run` returns) and restoring tracking per
/// `was_tracking`/`was_tracking_mode` -- except `Park`, which leaves
/// tracking off.
pub(super) async fn run(
    queue: &CommandQueue,
    kind: SlewKind,
    snapshot: &Snapshot,
    env: &SlewEnv,
    plan: &SetupPlan,
) -> CoreResult<()> {
    match kind {
        SlewKind::FindHome { axis } => {
            let id = queue.next_id();
            queue.enqueue(id, CommandKind::SearchHome(axis))?;
            let command = queue.get_result(id).await;
            if !command.successful {
                return Err(command
                    .error
                    .unwrap_or_else(|| crate::error::CoreError::queue_failed("home search failed")));
            }
            *env.current_target.lock().await = None;
        }
        SlewKind::GoToRaDec => {
            let (ra, dec) = current_ra_dec(queue, snapshot).await?;
            *env.side_of_pier.lock().await = resolved_side_of_pier(ra, dec, snapshot);

            if snapshot.alignment_mode == AlignmentMode::AltAz {
                let mode = if plan.was_tracking {
                    plan.was_tracking_mode
                } else {
                    TrackingMode::Sidereal
                };
                env.tracking.lock().await.set_tracking(true, mode, true);

                // `steps_per_arcsec` isn't a first-class Snapshot field; it's
                // approximated from the per-axis step factor (steps per
                // degree / 3600). Finer mounts (more steps per arcsec) settle
                // for longer to let backlash/gear mesh stabilize.
                let steps_per_arcsec = snapshot.factor_step[0] / 3600.0;
                let multiplier = if steps_per_arcsec <= 5.0 { 4 } else { 2 };
                let wait_ms = snapshot.alt_az_tracking_update_interval_ms * multiplier;
                tokio::time::sleep(std::time::Duration::from_millis(wait_ms)).await;

                // AltAz tracking is enabled unconditionally above, not via
                // the generic was_tracking restore below.
                return Ok(());
            }
            // Polar/GermanPolar RaDec GoTos have no settle of their own;
            // tracking is restored generically below.
        }
        SlewKind::Park => {
            // Parked mounts don't resume tracking, so skip the generic
            // restore entirely.
            *env.current_target.lock().await = None;
            *env.side_of_pier.lock().await = crate::util::PierSide::Unknown;
            return Ok(());
        }
        SlewKind::Handpad => {
            let (ra, dec) = current_ra_dec(queue, snapshot).await?;
            *env.current_target.lock().await = Some(Predictor::stationary(ra, dec, chrono::Utc::now()));
        }
        SlewKind::GoToAltAz | SlewKind::MoveAxis | SlewKind::Settle => {}
    }

    if plan.was_tracking {
        env.tracking.lock().await.set_tracking(true, plan.was_tracking_mode, false);
    }

    Ok(())
}

async fn current_ra_dec(queue: &CommandQueue, snapshot: &Snapshot) -> CoreResult<(f64, f64)> {
    let id = queue.next_id();
    queue.enqueue(id, CommandKind::GetPositionsDegrees)?;
    let command = queue.get_result(id).await;
    match command.result {
        Some(CommandOutcome::Positions(axes)) if command.successful => Ok(axes_to_ra_dec(axes, snapshot)),
        _ => Err(command
            .error
            .unwrap_or_else(|| crate::error::CoreError::queue_failed("get positions failed"))),
    }
}
