use crate::pec::PecEngine;
use crate::rates::{apply_custom_gearing, TrackingMode};
use crate::util::{Axis, AxisPair};
use crate::Snapshot;

/// Per-axis rate composition: base tracking rate, custom gearing,
/// guide-rate contribution, MoveAxis override, and (for the SkyWatcher
/// Alt/Az-polar pier-flipped orientation) a sign inversion. Mutated only on
/// the owning core's executor; readers reach it through the facade's
/// State Lock.
#[derive(Debug, Clone, Copy)]
pub struct TrackingEngine {
    pub mode: TrackingMode,
    /// MoveAxis rate override, deg/s; `0.0` means inactive and tracking
    /// (if any) applies normally on that axis.
    pub move_axis: AxisPair<f64>,
    /// Active pulse-guide contribution, signed deg/s.
    pub guide_offset: AxisPair<f64>,
}

impl Default for TrackingEngine {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Off,
            move_axis: AxisPair::default(),
            guide_offset: AxisPair::default(),
        }
    }
}

impl TrackingEngine {
    /// `Off → Sidereal|Lunar|Solar|King|AltAz` when the caller sets
    /// `tracking = true`; AltAz mounts force `AltAz` tracking regardless of
    /// the requested mode.
    pub fn set_tracking(&mut self, on: bool, requested_mode: TrackingMode, is_altaz_mount: bool) {
        if !on {
            self.mode = TrackingMode::Off;
            return;
        }
        self.mode = if is_altaz_mount {
            TrackingMode::AltAz
        } else {
            requested_mode
        };
    }

    pub fn set_move_axis_rate(&mut self, axis: Axis, rate: f64) {
        self.move_axis[axis] = rate;
    }

    /// The commanded mount rate for `axis`, deg/s. `altaz_rate_override` is
    /// the freshly recomputed Alt/Az tracking-rate vector component,
    /// recomputed every `alt_az_update_interval_ms`; `ra_steps` feeds the
    /// PEC lookup; `invert_for_pier_flip` applies the SkyWatcher Alt/Az
    /// polar sign inversion named in the rate-composition table.
    pub fn commanded_rate(
        &self,
        axis: Axis,
        snapshot: &Snapshot,
        pec: &PecEngine,
        ra_steps: i64,
        altaz_rate_override: Option<f64>,
        invert_for_pier_flip: bool,
    ) -> f64 {
        if self.move_axis[axis] != 0.0 {
            return self.move_axis[axis];
        }

        let mut rate = match (axis, self.mode) {
            (_, TrackingMode::Off) => 0.0,
            (_, TrackingMode::AltAz) => altaz_rate_override.unwrap_or(0.0),
            (Axis::Primary, mode) => {
                let base = apply_custom_gearing(mode.base_rate_deg_per_s(), snapshot.custom_gearing_ppm);
                pec.apply(
                    base,
                    ra_steps,
                    snapshot.pec_bin_steps,
                    snapshot.pec_bin_count,
                    snapshot.pec_on,
                    snapshot.ppec_on,
                )
            }
            (Axis::Secondary, _) => 0.0,
        };

        rate += self.guide_offset[axis];

        if invert_for_pier_flip {
            rate = -rate;
        }

        rate
    }
}
