use serde::{Deserialize, Serialize};

/// Back-end hardware family. Selecting a new value invalidates any cached
/// capabilities derived from the old one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountFamily {
    Simulator,
    SkyWatcher,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentMode {
    AltAz,
    GermanPolar,
    Polar,
}

/// Meaningful only for `AlignmentMode::Polar` on a SkyWatcher mount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolarMode {
    Left,
    Right,
}

/// Serial transport opening parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ComSettings {
    pub path: Option<String>, // None => autodetect; "ip:port" selects UDP serial-over-IP
    pub baud_rate: u32,
    pub read_timeout_ms: u32,
    pub dtr: bool,
    pub rts: bool,
}

impl Default for ComSettings {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: 9600,
            read_timeout_ms: 1000,
            dtr: false,
            rts: false,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObservingLocation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub elevation_m: f64,
}

impl Default for ObservingLocation {
    fn default() -> Self {
        Self {
            latitude_deg: 51.47,
            longitude_deg: 0.0,
            elevation_m: 15.0,
        }
    }
}

impl ObservingLocation {
    pub fn southern_hemisphere(&self) -> bool {
        self.latitude_deg < 0.0
    }
}

/// Per-axis limit and axis-conversion configuration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AxisSettings {
    pub steps_per_rev: [u32; 2],
    pub steps_worm_per_rev: [u32; 2],
    /// Simulator: steps-per-degree. SkyWatcher: radians-per-step.
    pub factor_step: [f64; 2],
    pub home_axes: [f64; 2],
    pub park_axes: [f64; 2],
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            steps_per_rev: [9_024_000, 9_024_000],
            steps_worm_per_rev: [47, 47],
            factor_step: [9_024_000. / 360., 9_024_000. / 360.],
            home_axes: [0., 90.],
            park_axes: [0., 90.],
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitSettings {
    pub hour_angle_limit_deg: f64,
    pub axis_limit_x_deg: f64,
    pub axis_upper_limit_y_deg: f64,
    pub axis_lower_limit_y_deg: f64,
    pub hz_limit_tracking: bool,
    pub limit_park: bool,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            hour_angle_limit_deg: 270.,
            axis_limit_x_deg: 180.,
            axis_upper_limit_y_deg: 180.,
            axis_lower_limit_y_deg: -180.,
            hz_limit_tracking: true,
            limit_park: false,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GuideSettings {
    pub guide_rate_offset_x: f64,
    pub guide_rate_offset_y: f64,
    pub min_pulse_ms_ra: u32,
    pub min_pulse_ms_dec: u32,
    pub dec_pulse_to_goto: bool,
}

impl Default for GuideSettings {
    fn default() -> Self {
        Self {
            guide_rate_offset_x: 0.5,
            guide_rate_offset_y: 0.5,
            min_pulse_ms_ra: 20,
            min_pulse_ms_dec: 20,
            dec_pulse_to_goto: false,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PecSettings {
    pub pec_on: bool,
    pub ppec_on: bool,
    pub pec_bin_count: u32,
    pub pec_bin_steps: u32,
    pub pec_offset: i64,
}

impl Default for PecSettings {
    fn default() -> Self {
        Self {
            pec_on: false,
            ppec_on: false,
            pec_bin_count: 47,
            pec_bin_steps: 192_000,
            pec_offset: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimingSettings {
    pub display_interval_ms: u64,
    pub alt_az_tracking_update_interval_ms: u64,
    pub goto_precision_deg: f64,
    pub slew_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            display_interval_ms: 200,
            alt_az_tracking_update_interval_ms: 2500,
            goto_precision_deg: 0.5 / 3600.,
            slew_settle_ms: 500,
        }
    }
}

/// Custom gearing corrections, expressed as offsets from the nominal
/// sidereal constant.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GearingSettings {
    pub custom_gearing_ppm: f64,
}

impl Default for GearingSettings {
    fn default() -> Self {
        Self {
            custom_gearing_ppm: 0.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SlewSettings {
    pub max_slew_rate_deg_per_s: f64,
}

impl Default for SlewSettings {
    fn default() -> Self {
        Self {
            max_slew_rate_deg_per_s: 4.0,
        }
    }
}

/// The persisted settings shape (confy-serialized). `Snapshot::from_settings`
/// is the only pure factory the rest of the core is allowed to call.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub mount_family: MountFamilyConfig,
    pub com: ComSettings,
    pub observation_location: ObservingLocation,
    pub alignment: AlignmentSettings,
    pub axis: AxisSettings,
    pub limits: LimitSettings,
    pub guide: GuideSettings,
    pub pec: PecSettings,
    pub timing: TimingSettings,
    pub gearing: GearingSettings,
    pub slew: SlewSettings,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MountFamilyConfig {
    pub family: MountFamily,
}

impl Default for MountFamilyConfig {
    fn default() -> Self {
        Self {
            family: MountFamily::Simulator,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlignmentSettings {
    pub mode: AlignmentMode,
    pub polar_mode: PolarMode,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            mode: AlignmentMode::GermanPolar,
            polar_mode: PolarMode::Right,
        }
    }
}
