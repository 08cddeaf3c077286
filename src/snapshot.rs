use crate::config::{AlignmentMode, Config, MountFamily, PolarMode};

/// 15 arcsec/s, the nominal sidereal rate used as the base for the eight
/// slew-speed tiers derived from `max_slew_rate_deg_per_s`.
const BASE_SLEW_SPEED_ARCSEC_PER_S: f64 = 15.0;
const SLEW_SPEED_MULTIPLIERS: [f64; 8] = [1., 2., 8., 16., 32., 64., 600., 800.];

/// Immutable, validated view of mount/site parameters consumed by every pure
/// algorithm in the core. Cheap to clone: callers should thread an
/// `Arc<Snapshot>` rather than a mutable settings store.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub mount_family: MountFamily,
    pub alignment_mode: AlignmentMode,
    pub polar_mode: PolarMode,

    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub elevation_m: f64,
    pub southern_hemisphere: bool,

    pub steps_per_rev: [u32; 2],
    pub steps_worm_per_rev: [u32; 2],
    pub factor_step: [f64; 2],

    pub max_slew_rate_deg_per_s: f64,
    pub slew_speeds: [f64; 8],

    pub hour_angle_limit_deg: f64,
    pub axis_limit_x_deg: f64,
    pub axis_upper_limit_y_deg: f64,
    pub axis_lower_limit_y_deg: f64,
    pub hz_limit_tracking: bool,
    pub limit_park: bool,

    pub guide_rate_offset_x: f64,
    pub guide_rate_offset_y: f64,

    pub pec_on: bool,
    pub ppec_on: bool,
    pub pec_bin_count: u32,
    pub pec_bin_steps: u32,
    pub pec_offset: i64,

    pub min_pulse_ms_ra: u32,
    pub min_pulse_ms_dec: u32,
    pub dec_pulse_to_goto: bool,

    pub home_axes: [f64; 2],
    pub park_axes: [f64; 2],

    pub goto_precision_deg: f64,
    pub slew_settle_ms: u64,
    pub display_interval_ms: u64,
    pub alt_az_tracking_update_interval_ms: u64,

    pub custom_gearing_ppm: f64,

    /// Local Sidereal Time at snapshot construction, hours. Re-derived by
    /// `with_local_sidereal_time` for predictive re-targeting.
    pub local_sidereal_time_hours: f64,
}

impl Snapshot {
    /// Build a Snapshot from externally-supplied settings, using `now` to
    /// compute Local Sidereal Time. This is the only constructor pure
    /// algorithms should rely on; nothing downstream reaches back into a
    /// mutable settings store.
    pub fn from_settings(config: &Config, now: chrono::DateTime<chrono::Utc>) -> Self {
        let lst = crate::astro_math::calculate_local_sidereal_time(
            now,
            config.observation_location.longitude_deg,
        );
        Self::from_settings_at_lst(config, lst)
    }

    /// Convenience constructor for tests elsewhere in the crate: default
    /// settings at a fixed, arbitrary instant.
    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        Self::from_settings(
            &Config::default(),
            chrono::TimeZone::ymd(&chrono::Utc, 2021, 6, 1).and_hms(0, 0, 0),
        )
    }

    pub fn with_local_sidereal_time(&self, lst_hours: f64) -> Self {
        let mut next = self.clone();
        next.local_sidereal_time_hours = lst_hours;
        next
    }

    fn from_settings_at_lst(config: &Config, lst_hours: f64) -> Self {
        let slew_speeds = derive_slew_speeds(config.slew.max_slew_rate_deg_per_s);

        Snapshot {
            mount_family: config.mount_family.family,
            alignment_mode: config.alignment.mode,
            polar_mode: config.alignment.polar_mode,

            latitude_deg: config.observation_location.latitude_deg,
            longitude_deg: config.observation_location.longitude_deg,
            elevation_m: config.observation_location.elevation_m,
            southern_hemisphere: config.observation_location.southern_hemisphere(),

            steps_per_rev: config.axis.steps_per_rev,
            steps_worm_per_rev: config.axis.steps_worm_per_rev,
            factor_step: config.axis.factor_step,

            max_slew_rate_deg_per_s: config.slew.max_slew_rate_deg_per_s,
            slew_speeds,

            hour_angle_limit_deg: config.limits.hour_angle_limit_deg,
            axis_limit_x_deg: config.limits.axis_limit_x_deg,
            axis_upper_limit_y_deg: config.limits.axis_upper_limit_y_deg,
            axis_lower_limit_y_deg: config.limits.axis_lower_limit_y_deg,
            hz_limit_tracking: config.limits.hz_limit_tracking,
            limit_park: config.limits.limit_park,

            guide_rate_offset_x: config.guide.guide_rate_offset_x,
            guide_rate_offset_y: config.guide.guide_rate_offset_y,

            pec_on: config.pec.pec_on,
            ppec_on: config.pec.ppec_on,
            pec_bin_count: config.pec.pec_bin_count,
            pec_bin_steps: config.pec.pec_bin_steps,
            pec_offset: config.pec.pec_offset,

            min_pulse_ms_ra: config.guide.min_pulse_ms_ra,
            min_pulse_ms_dec: config.guide.min_pulse_ms_dec,
            dec_pulse_to_goto: config.guide.dec_pulse_to_goto,

            home_axes: config.axis.home_axes,
            park_axes: config.axis.park_axes,

            goto_precision_deg: config.timing.goto_precision_deg,
            slew_settle_ms: config.timing.slew_settle_ms,
            display_interval_ms: config.timing.display_interval_ms,
            alt_az_tracking_update_interval_ms: config.timing.alt_az_tracking_update_interval_ms,

            custom_gearing_ppm: config.gearing.custom_gearing_ppm,

            local_sidereal_time_hours: lst_hours,
        }
    }
}

/// Recompute the eight slew-speed tiers from the configured ceiling,
/// preserving `speed[i+1] > speed[i]`.
fn derive_slew_speeds(max_slew_rate_deg_per_s: f64) -> [f64; 8] {
    let base_deg_per_s = BASE_SLEW_SPEED_ARCSEC_PER_S / 3600.;
    let mut raw = [0.0; 8];
    for (i, mult) in SLEW_SPEED_MULTIPLIERS.iter().enumerate() {
        raw[i] = base_deg_per_s * mult;
    }

    let top = raw[raw.len() - 1];
    let scale = if top > max_slew_rate_deg_per_s {
        max_slew_rate_deg_per_s / top
    } else {
        1.0
    };

    let mut speeds = [0.0; 8];
    for (i, r) in raw.iter().enumerate() {
        speeds[i] = r * scale;
    }
    speeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn slew_speeds_are_strictly_increasing() {
        let speeds = derive_slew_speeds(4.0);
        for pair in speeds.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn slew_speeds_respect_ceiling() {
        let speeds = derive_slew_speeds(1.0);
        assert!((speeds[7] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn from_settings_captures_hemisphere() {
        let mut config = Config::default();
        config.observation_location.latitude_deg = -33.0;
        let snapshot = Snapshot::from_settings(&config, Utc.ymd(2021, 1, 30).and_hms(21, 20, 0));
        assert!(snapshot.southern_hemisphere);
    }
}
