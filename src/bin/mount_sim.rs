//! Small demonstration binary: brings up a `MountCore` against the
//! Simulator back end, slews to a target, lets tracking run for a few
//! ticks, then parks. Useful for exercising the core without any hardware
//! or a network front end attached.

use telescope_mount_core::rates::TrackingMode;
use telescope_mount_core::util::Axis;
use telescope_mount_core::{Config, MountCore};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config: Config = confy::load("telescope-mount-core", "mount-sim").unwrap_or_default();
    let core = MountCore::new(config);

    core.connect().await?;
    tracing::info!("connected to simulator back end");

    core.set_tracking(true, TrackingMode::Sidereal, false).await;

    let handle = core.slew_ra_dec(6.0, 45.0).await?;
    let outcome = handle.join().await?;
    tracing::info!(?outcome, "goto finished");
    core.set_side_of_pier(telescope_mount_core::util::PierSide::Normal).await;

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let position = core.position();
    tracing::info!(
        ra_hours = position.ra_hours,
        dec_deg = position.dec_deg,
        "tracking position"
    );

    core.pulse_guide(Axis::Primary, telescope_mount_core::tracking::GuideDirection::Positive, 200)
        .await?;

    let handle = core.slew_to_park().await?;
    let outcome = handle.join().await?;
    tracing::info!(?outcome, "park finished");

    core.disconnect().await;
    Ok(())
}
