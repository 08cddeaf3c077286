use crate::astro_math::{
    calculate_alt_from_ha_dec, calculate_az_from_ha_dec, calculate_ha_dec_from_alt_az,
    deg_to_hours, hours_to_deg, modulo, Degrees, Hours,
};
use crate::config::{AlignmentMode, MountFamily, PolarMode};
use crate::Snapshot;

/// An axis transform that is its own inverse — every cell in the
/// `(alignment_mode, mount_family, hemisphere, polar_mode)` table below
/// happens to be an involution, so `app_to_mount` and `mount_to_app` share
/// one table.
#[derive(Debug, Clone, Copy)]
enum AxisOp {
    Identity,
    Negate,
    ReflectFrom180,
}

impl AxisOp {
    fn apply(self, v: f64) -> f64 {
        match self {
            AxisOp::Identity => v,
            AxisOp::Negate => -v,
            AxisOp::ReflectFrom180 => 180. - v,
        }
    }
}

/// The normative 12-row `(alignment_mode, mount_family, hemisphere,
/// polar_mode)` table.
fn axis_ops(snapshot: &Snapshot) -> (AxisOp, AxisOp) {
    use AlignmentMode::*;
    use AxisOp::*;
    use MountFamily::*;

    let sh = snapshot.southern_hemisphere;

    match snapshot.alignment_mode {
        AltAz => (Identity, Identity),
        GermanPolar => match (snapshot.mount_family, sh) {
            (Simulator, true) => (ReflectFrom180, Identity),
            (Simulator, false) => (Identity, Identity),
            (SkyWatcher, true) => (ReflectFrom180, Identity),
            (SkyWatcher, false) => (Identity, ReflectFrom180),
        },
        Polar => match (snapshot.mount_family, sh, snapshot.polar_mode) {
            (Simulator, true, _) => (Negate, Identity),
            (Simulator, false, _) => (Identity, Identity),
            (SkyWatcher, true, PolarMode::Left) => (ReflectFrom180, Identity),
            (SkyWatcher, false, PolarMode::Left) => (Identity, ReflectFrom180),
            (SkyWatcher, true, PolarMode::Right) => (Negate, Identity),
            (SkyWatcher, false, PolarMode::Right) => (Identity, Identity),
        },
    }
}

pub fn app_to_mount(app: [f64; 2], snapshot: &Snapshot) -> [f64; 2] {
    let (x_op, y_op) = axis_ops(snapshot);
    [x_op.apply(app[0]), y_op.apply(app[1])]
}

/// Every table cell is an involution, so this is literally `app_to_mount`
/// again; kept as a distinct name because callers read in the direction
/// that matches their data flow.
pub fn mount_to_app(mount: [f64; 2], snapshot: &Snapshot) -> [f64; 2] {
    app_to_mount(mount, snapshot)
}

/// Whether `axes` (mount frame) lie within the configured hardware
/// envelope used to gate the alternate-position policy.
fn within_axis_limits(axes: [f64; 2], snapshot: &Snapshot) -> bool {
    axes[0].abs() <= snapshot.axis_limit_x_deg
        && axes[1] <= snapshot.axis_upper_limit_y_deg
        && axes[1] >= snapshot.axis_lower_limit_y_deg
}

/// Many orientations have two valid axis representations: `±180°` in x with
/// `y' = 180 − y` for equatorial mounts, or `±360°` in x for AltAz. Returns
/// the alternate iff it lies inside configured hardware limits.
pub fn get_alternate_position(mount_axes: [f64; 2], snapshot: &Snapshot) -> Option<[f64; 2]> {
    let alternate = match snapshot.alignment_mode {
        AlignmentMode::AltAz => {
            let shift = if mount_axes[0] >= 0. { -360. } else { 360. };
            [mount_axes[0] + shift, mount_axes[1]]
        }
        _ => [modulo(mount_axes[0] + 180., 360.), 180. - mount_axes[1]],
    };

    if within_axis_limits(alternate, snapshot) {
        Some(alternate)
    } else {
        None
    }
}

/// The `ra_dec_to_axes`/`az_alt_to_axes` pipelines always consult the
/// alternate-position hook and prefer the alternate when one is returned.
fn prefer_alternate(mount_axes: [f64; 2], snapshot: &Snapshot) -> [f64; 2] {
    get_alternate_position(mount_axes, snapshot).unwrap_or(mount_axes)
}

/// Normalise an hour-angle/declination pair into app-frame axes with `x ∈
/// [0, 180)` and `y` spanning `[−180, 180]`, flipping through-the-pole when
/// the raw hour angle falls in the western half.
fn ha_dec_to_app(ha_hours: Hours, dec_deg: Degrees, snapshot: &Snapshot) -> [f64; 2] {
    let dec = if snapshot.southern_hemisphere {
        -dec_deg
    } else {
        dec_deg
    };
    let ha_deg = modulo(hours_to_deg(ha_hours), 360.);

    if ha_deg < 180. {
        [ha_deg, dec]
    } else {
        [ha_deg - 180., 180. - dec]
    }
}

/// Inverse of [`ha_dec_to_app`]. The two branches are distinguishable
/// because unflipped `y` always lies in `[-90, 90]` while a flipped `y =
/// 180 − dec` lies in `[90, 270]`.
fn app_to_ha_dec(app: [f64; 2], snapshot: &Snapshot) -> (Hours, Degrees) {
    let (ha_deg, dec_before_hemisphere) = if app[1] <= 90. {
        (app[0], app[1])
    } else {
        (app[0] + 180., 180. - app[1])
    };

    let dec = if snapshot.southern_hemisphere {
        -dec_before_hemisphere
    } else {
        dec_before_hemisphere
    };

    (modulo(deg_to_hours(ha_deg), 24.), dec)
}

pub fn ha_dec_to_axes(ha_hours: Hours, dec_deg: Degrees, snapshot: &Snapshot) -> [f64; 2] {
    let app = ha_dec_to_app(ha_hours, dec_deg, snapshot);
    let mount = app_to_mount(app, snapshot);
    prefer_alternate(mount, snapshot)
}

fn az_alt_to_app(az_deg: Degrees, alt_deg: Degrees) -> [f64; 2] {
    [modulo(az_deg, 360.), alt_deg]
}

pub fn az_alt_to_axes(az_deg: Degrees, alt_deg: Degrees, snapshot: &Snapshot) -> [f64; 2] {
    match snapshot.alignment_mode {
        AlignmentMode::AltAz => {
            let app = az_alt_to_app(az_deg, alt_deg);
            let mount = app_to_mount(app, snapshot);
            prefer_alternate(mount, snapshot)
        }
        _ => {
            let (ha, dec) = calculate_ha_dec_from_alt_az(alt_deg, az_deg, snapshot.latitude_deg);
            ha_dec_to_axes(ha, dec, snapshot)
        }
    }
}

/// `ra_dec_to_axes`: for AltAz mounts, project through Alt/Az via the site
/// latitude and LST; otherwise go straight through HA/Dec.
pub fn ra_dec_to_axes(ra_hours: Hours, dec_deg: Degrees, snapshot: &Snapshot) -> [f64; 2] {
    let ha_hours = modulo(snapshot.local_sidereal_time_hours - ra_hours, 24.);

    match snapshot.alignment_mode {
        AlignmentMode::AltAz => {
            let alt = calculate_alt_from_ha_dec(ha_hours, dec_deg, snapshot.latitude_deg);
            let az = calculate_az_from_ha_dec(ha_hours, dec_deg, snapshot.latitude_deg);
            let app = az_alt_to_app(az, alt);
            let mount = app_to_mount(app, snapshot);
            prefer_alternate(mount, snapshot)
        }
        _ => ha_dec_to_axes(ha_hours, dec_deg, snapshot),
    }
}

pub fn axes_to_alt_az(mount_axes: [f64; 2], snapshot: &Snapshot) -> (Degrees, Degrees) {
    let app = mount_to_app(mount_axes, snapshot);
    match snapshot.alignment_mode {
        AlignmentMode::AltAz => (modulo(app[0], 360.), app[1]),
        _ => {
            let (ha, dec) = app_to_ha_dec(app, snapshot);
            let alt = calculate_alt_from_ha_dec(ha, dec, snapshot.latitude_deg);
            let az = calculate_az_from_ha_dec(ha, dec, snapshot.latitude_deg);
            (az, alt)
        }
    }
}

pub fn axes_to_ra_dec(mount_axes: [f64; 2], snapshot: &Snapshot) -> (Hours, Degrees) {
    let app = mount_to_app(mount_axes, snapshot);
    let (ha, dec) = match snapshot.alignment_mode {
        AlignmentMode::AltAz => {
            let az = modulo(app[0], 360.);
            let alt = app[1];
            calculate_ha_dec_from_alt_az(alt, az, snapshot.latitude_deg)
        }
        _ => app_to_ha_dec(app, snapshot),
    };

    (modulo(snapshot.local_sidereal_time_hours - ha, 24.), dec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use assert_float_eq::*;
    use chrono::{TimeZone, Utc};

    fn snapshot_with(
        mode: AlignmentMode,
        family: MountFamily,
        southern: bool,
        polar_mode: PolarMode,
    ) -> Snapshot {
        let mut config = Config::default();
        config.alignment.mode = mode;
        config.alignment.polar_mode = polar_mode;
        config.mount_family.family = family;
        config.observation_location.latitude_deg = if southern { -33.0 } else { 40.0 };
        config.limits.axis_limit_x_deg = 180.;
        config.limits.axis_upper_limit_y_deg = 180.;
        config.limits.axis_lower_limit_y_deg = -180.;
        Snapshot::from_settings(&config, Utc.ymd(2021, 6, 1).and_hms(0, 0, 0))
    }

    #[test]
    fn app_to_mount_round_trips_all_twelve_cells() {
        let modes = [AlignmentMode::AltAz, AlignmentMode::GermanPolar, AlignmentMode::Polar];
        let families = [MountFamily::Simulator, MountFamily::SkyWatcher];
        let hemispheres = [true, false];
        let polar_modes = [PolarMode::Left, PolarMode::Right];

        for &mode in &modes {
            for &family in &families {
                for &sh in &hemispheres {
                    for &pm in &polar_modes {
                        let snapshot = snapshot_with(mode, family, sh, pm);
                        let app = [37.0, 12.0];
                        let mount = app_to_mount(app, &snapshot);
                        let back = mount_to_app(mount, &snapshot);
                        assert_float_absolute_eq!(back[0], app[0], 1E-9);
                        assert_float_absolute_eq!(back[1], app[1], 1E-9);
                    }
                }
            }
        }
    }

    #[test]
    fn ha_dec_axes_round_trip_without_alternate() {
        let snapshot = snapshot_with(
            AlignmentMode::GermanPolar,
            MountFamily::SkyWatcher,
            false,
            PolarMode::Right,
        );
        let ha = 3.5;
        let dec = 22.0;
        let axes = ha_dec_to_axes(ha, dec, &snapshot);
        // No alternate available with symmetric limits this wide, so the
        // primary representation survives the round trip.
        let app = mount_to_app(axes, &snapshot);
        let (ha2, dec2) = app_to_ha_dec(app, &snapshot);
        assert_float_absolute_eq!(ha2, ha, 1E-9);
        assert_float_absolute_eq!(dec2, dec, 1E-9);
    }

    #[test]
    fn alternate_position_respects_limits() {
        let mut config = Config::default();
        config.alignment.mode = AlignmentMode::GermanPolar;
        config.mount_family.family = MountFamily::Simulator;
        config.limits.axis_limit_x_deg = 10.; // deliberately too tight for the alternate
        config.limits.axis_upper_limit_y_deg = 180.;
        config.limits.axis_lower_limit_y_deg = -180.;
        let snapshot = Snapshot::from_settings(&config, Utc.ymd(2021, 6, 1).and_hms(0, 0, 0));

        assert!(get_alternate_position([5.0, 30.0], &snapshot).is_none());
    }
}
