use crate::astro_math::{Degrees, Hours};

/// Projects a target RA/Dec forward in time given offset rates. Used by the
/// Slew Controller's precision phase when chasing a moving target, and by
/// AltAz tracking to re-aim at the expected settle time.
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    ra_target: Hours,
    dec_target: Degrees,
    rate_ra: f64,  // hours/s
    rate_dec: f64, // deg/s
    reference_time: chrono::DateTime<chrono::Utc>,
}

impl Predictor {
    pub fn new(
        ra_target: Hours,
        dec_target: Degrees,
        rate_ra: f64,
        rate_dec: f64,
        reference_time: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            ra_target,
            dec_target,
            rate_ra,
            rate_dec,
            reference_time,
        }
    }

    /// Seed a predictor with a stationary target (no offset rates), used
    /// when Setup, Home or Handpad completion resets tracking.
    pub fn stationary(
        ra_target: Hours,
        dec_target: Degrees,
        reference_time: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self::new(ra_target, dec_target, 0.0, 0.0, reference_time)
    }

    pub fn get_ra_dec_at(&self, t: chrono::DateTime<chrono::Utc>) -> (Hours, Degrees) {
        let dt_s = (t - self.reference_time).num_milliseconds() as f64 / 1000.0;
        (
            self.ra_target + self.rate_ra * dt_s,
            self.dec_target + self.rate_dec * dt_s,
        )
    }

    pub fn target(&self) -> (Hours, Degrees) {
        (self.ra_target, self.dec_target)
    }

    pub fn rates(&self) -> (f64, f64) {
        (self.rate_ra, self.rate_dec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn projects_linearly_from_reference_time() {
        let t0 = Utc.ymd(2021, 1, 1).and_hms(0, 0, 0);
        let predictor = Predictor::new(6.0, 45.0, 0.001, -0.0005, t0);

        let (ra, dec) = predictor.get_ra_dec_at(t0 + Duration::seconds(100));
        assert!((ra - (6.0 + 0.1)).abs() < 1e-9);
        assert!((dec - (45.0 - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn stationary_predictor_does_not_move() {
        let t0 = Utc.ymd(2021, 1, 1).and_hms(0, 0, 0);
        let predictor = Predictor::stationary(6.0, 45.0, t0);
        let (ra, dec) = predictor.get_ra_dec_at(t0 + Duration::seconds(500));
        assert_eq!(ra, 6.0);
        assert_eq!(dec, 45.0);
    }
}
