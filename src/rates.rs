/// The base drive rates a mount can track at, as a crate-local enum: the
/// ASCOM façade and its `DriveRate` type are out of scope for this core.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingMode {
    Off,
    Sidereal,
    Lunar,
    Solar,
    King,
    AltAz,
}

impl TrackingMode {
    /// Nominal rate in degrees/second, before custom gearing or PEC are
    /// applied. `Off` and `AltAz` have no fixed rate of their own: `Off` is
    /// zero, `AltAz` is recomputed every tracking tick from the projected
    /// target.
    pub fn base_rate_deg_per_s(self) -> f64 {
        match self {
            TrackingMode::Off => 0.0,
            TrackingMode::Sidereal => 0.00417809,
            TrackingMode::Lunar => 0.004024138,
            TrackingMode::Solar => 0.00416665,
            TrackingMode::King => 0.00417692,
            TrackingMode::AltAz => 0.0,
        }
    }

    pub fn is_tracking(self) -> bool {
        !matches!(self, TrackingMode::Off)
    }
}

/// Apply the configured custom-gearing correction (parts per million of the
/// sidereal constant) to a base rate.
pub fn apply_custom_gearing(rate_deg_per_s: f64, custom_gearing_ppm: f64) -> f64 {
    rate_deg_per_s * (1.0 + custom_gearing_ppm / 1_000_000.0)
}
