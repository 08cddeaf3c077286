use crate::astro_math::{hours_to_deg, modulo};
use crate::config::{AlignmentMode, MountFamily, PolarMode};
use crate::coords::transforms::{mount_to_app, ra_dec_to_axes};
use crate::util::PierSide;
use crate::Snapshot;

/// Whether `app_axes` (app frame) lie close enough to the meridian that no
/// pier flip is needed, per the `hour_angle_limit_deg` envelope.
fn is_within_flip_limits(mount_axes: [f64; 2], snapshot: &Snapshot) -> bool {
    let app = mount_to_app(mount_axes, snapshot);
    app[0].abs() <= snapshot.hour_angle_limit_deg
}

/// Which side of the pole the mount ends up on for a given target, per the
/// (mode, family, hemisphere) rules. Declination only ever
/// decides *whether* a flip is needed -- that's `is_within_flip_limits`'s
/// job -- not which side a given hour angle resolves to, since the HA/side
/// relationship is symmetric about the pole for any declination; it is kept
/// as a parameter because callers compute it alongside RA and it documents
/// that symmetry rather than hiding an unused input.
fn target_side_of_pier(ra_hours: f64, dec_deg: f64, snapshot: &Snapshot) -> PierSide {
    let _ = dec_deg;
    let ha_hours = modulo(snapshot.local_sidereal_time_hours - ra_hours, 24.);
    let mut ha_deg = modulo(hours_to_deg(ha_hours), 360.);

    // South of the equator the counterweight-down side swaps relative to
    // the Northern-hemisphere convention used below.
    if snapshot.southern_hemisphere {
        ha_deg = modulo(360. - ha_deg, 360.);
    }

    let normal_below_180 = match (snapshot.mount_family, snapshot.alignment_mode, snapshot.polar_mode) {
        // Polar-mode SkyWatcher mounts report side of pier relative to the
        // configured counterweight orientation rather than HA alone.
        (MountFamily::SkyWatcher, AlignmentMode::Polar, PolarMode::Left) => false,
        _ => true,
    };

    if (ha_deg < 180.) == normal_below_180 {
        PierSide::Normal
    } else {
        PierSide::ThroughThePole
    }
}

/// Where a RaDec target lands once a slew there completes, regardless of
/// whether the flip-limit envelope required a flip. The facade records the
/// resolved side once the mount confirms position.
pub fn resolved_side_of_pier(ra_hours: f64, dec_deg: f64, snapshot: &Snapshot) -> PierSide {
    if snapshot.alignment_mode == AlignmentMode::AltAz {
        return PierSide::Unknown;
    }
    target_side_of_pier(ra_hours, dec_deg, snapshot)
}

/// `is_flip_required(target_ra_dec, current_side_of_pier, snapshot)`: no
/// flip needed on AltAz mounts (no pier), or when the current side is
/// `Unknown` (cannot decide), or when the target still falls within the
/// flip-limit window.
pub fn is_flip_required(
    target: (f64, f64),
    current_side: PierSide,
    snapshot: &Snapshot,
) -> bool {
    if snapshot.alignment_mode == AlignmentMode::AltAz {
        return false;
    }
    if current_side.is_unknown() {
        return false;
    }

    let (ra, dec) = target;
    let mount_axes = ra_dec_to_axes(ra, dec, snapshot);
    if is_within_flip_limits(mount_axes, snapshot) {
        return false;
    }

    target_side_of_pier(ra, dec, snapshot) != current_side
}
