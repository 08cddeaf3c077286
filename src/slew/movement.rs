use crate::coords::ra_dec_to_axes;
use crate::error::{CoreError, CoreResult};
use crate::predictor::Predictor;
use crate::queue::{CommandKind, CommandOutcome, CommandQueue};
use crate::slew::SlewKind;
use crate::util::{AbortResult, Axis};
use crate::Snapshot;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL_MS: u64 = 50;
const MAX_PRECISION_PASSES: u32 = 20;

/// Coarse GoTo to the initial target, then repeated precision passes that,
/// for a RaDec slew, re-derive the target axes from the predictor's
/// projected RA/Dec at the current instant (feed-forward re-aim for a
/// moving target) before stepping toward it damped by `damping_x`/
/// `damping_y`. Other slew kinds have no moving target to chase and keep
/// stepping toward the fixed axes Setup computed. Returns `Aborted` as
/// soon as cancellation is observed, never mid-command.
pub(super) async fn run(
    queue: &CommandQueue,
    predictor: &Predictor,
    kind: SlewKind,
    initial_target_axes: [f64; 2],
    snapshot: &Snapshot,
    token: &CancellationToken,
    damping_x: f64,
    damping_y: f64,
) -> CoreResult<AbortResult<(), ()>> {
    let mut target_axes = initial_target_axes;
    goto(queue, target_axes).await?;

    if wait_for_stop_or_cancel(queue, token).await? {
        return Ok(AbortResult::Aborted(()));
    }

    for _ in 0..MAX_PRECISION_PASSES {
        if token.is_cancelled() {
            return Ok(AbortResult::Aborted(()));
        }

        let actual = get_positions(queue).await?;

        if matches!(kind, SlewKind::GoToRaDec) {
            let (ra, dec) = predictor.get_ra_dec_at(chrono::Utc::now());
            target_axes = ra_dec_to_axes(ra, dec, snapshot);
        }

        let error_x = target_axes[0] - actual[0];
        let error_y = target_axes[1] - actual[1];

        if error_x.abs() <= snapshot.goto_precision_deg && error_y.abs() <= snapshot.goto_precision_deg {
            return Ok(AbortResult::Completed(()));
        }

        target_axes = [actual[0] + error_x * damping_x, actual[1] + error_y * damping_y];
        goto(queue, target_axes).await?;

        if wait_for_stop_or_cancel(queue, token).await? {
            return Ok(AbortResult::Aborted(()));
        }
    }

    Err(CoreError::Timeout("slew precision passes exhausted".into()))
}

async fn goto(queue: &CommandQueue, axes: [f64; 2]) -> CoreResult<()> {
    for axis in Axis::ALL {
        let id = queue.next_id();
        queue.enqueue(id, CommandKind::GoToAxisTarget(axis, axes[axis.index()]))?;
        let command = queue.get_result(id).await;
        if !command.successful {
            return Err(command.error.unwrap_or_else(|| CoreError::queue_failed("goto failed")));
        }
    }
    Ok(())
}

async fn get_positions(queue: &CommandQueue) -> CoreResult<[f64; 2]> {
    let id = queue.next_id();
    queue.enqueue(id, CommandKind::GetPositionsDegrees)?;
    let command = queue.get_result(id).await;
    match command.result {
        Some(CommandOutcome::Positions(p)) if command.successful => Ok(p),
        _ => Err(command.error.unwrap_or_else(|| CoreError::queue_failed("get positions failed"))),
    }
}

async fn wait_for_stop_or_cancel(queue: &CommandQueue, token: &CancellationToken) -> CoreResult<bool> {
    loop {
        if token.is_cancelled() {
            return Ok(true);
        }

        let mut all_stopped = true;
        for axis in Axis::ALL {
            let id = queue.next_id();
            queue.enqueue(id, CommandKind::IsAxisFullStop(axis))?;
            let command = queue.get_result(id).await;
            match command.result {
                Some(CommandOutcome::FullStop(stopped)) if command.successful => {
                    all_stopped &= stopped;
                }
                _ => {
                    return Err(command
                        .error
                        .unwrap_or_else(|| CoreError::queue_failed("full-stop check failed")))
                }
            }
        }

        if all_stopped {
            return Ok(false);
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS)) => {}
            _ = token.cancelled() => return Ok(true),
        }
    }
}
