use crate::error::{CoreError, CoreResult};
use crate::rates::TrackingMode;
use crate::tracking::engine::TrackingEngine;
use crate::util::Axis;
use crate::Snapshot;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideDirection {
    Positive,
    Negative,
}

impl GuideDirection {
    fn sign(self) -> f64 {
        match self {
            GuideDirection::Positive => 1.0,
            GuideDirection::Negative => -1.0,
        }
    }
}

/// At-most-one active pulse per axis; cancelling restores the pre-pulse
/// rate rather than leaving the axis stopped.
#[derive(Default)]
pub struct GuideController {
    engine: Arc<Mutex<TrackingEngine>>,
    active: std::sync::Mutex<[Option<CancellationToken>; 2]>,
}

impl GuideController {
    pub fn new(engine: Arc<Mutex<TrackingEngine>>) -> Self {
        Self {
            engine,
            active: std::sync::Mutex::new([None, None]),
        }
    }

    /// Drive a guide pulse to completion or cancellation. The Right
    /// Ascension axis pulses by adding a signed rate offset for the
    /// duration; Declination does the same unless
    /// `snapshot.dec_pulse_to_goto` routes it through a short GoTo instead,
    /// which the caller (the facade) handles before reaching here.
    pub async fn pulse_guide(
        &self,
        axis: Axis,
        direction: GuideDirection,
        duration_ms: u32,
        snapshot: &Snapshot,
    ) -> CoreResult<()> {
        let min_ms = match axis {
            Axis::Primary => snapshot.min_pulse_ms_ra,
            Axis::Secondary => snapshot.min_pulse_ms_dec,
        };
        if duration_ms < min_ms {
            return Err(CoreError::invalid_argument(format!(
                "pulse duration {duration_ms}ms below minimum {min_ms}ms"
            )));
        }

        let token = {
            let mut slots = self.active.lock().unwrap();
            if slots[axis.index()].is_some() {
                return Err(CoreError::invalid_state("a guide pulse is already active on this axis"));
            }
            let token = CancellationToken::new();
            slots[axis.index()] = Some(token.clone());
            token
        };

        let offset = guide_offset_deg_per_s(axis, direction, snapshot);
        {
            let mut engine = self.engine.lock().await;
            engine.guide_offset[axis] = offset;
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(duration_ms as u64)) => {}
            _ = token.cancelled() => {}
        }

        {
            let mut engine = self.engine.lock().await;
            engine.guide_offset[axis] = 0.0;
        }
        self.active.lock().unwrap()[axis.index()] = None;

        Ok(())
    }

    pub fn cancel(&self, axis: Axis) {
        if let Some(token) = self.active.lock().unwrap()[axis.index()].take() {
            token.cancel();
        }
    }

    pub fn is_active(&self, axis: Axis) -> bool {
        self.active.lock().unwrap()[axis.index()].is_some()
    }
}

fn guide_offset_deg_per_s(axis: Axis, direction: GuideDirection, snapshot: &Snapshot) -> f64 {
    let sidereal = TrackingMode::Sidereal.base_rate_deg_per_s();
    let fraction = match axis {
        Axis::Primary => snapshot.guide_rate_offset_x,
        Axis::Secondary => snapshot.guide_rate_offset_y,
    };
    sidereal * fraction * direction.sign()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pulse_guide_restores_zero_offset_after_completion() {
        let engine = Arc::new(Mutex::new(TrackingEngine::default()));
        let controller = GuideController::new(engine.clone());
        let snapshot = Snapshot::default_for_tests();

        controller
            .pulse_guide(Axis::Primary, GuideDirection::Positive, 10, &snapshot)
            .await
            .unwrap();

        assert_eq!(engine.lock().await.guide_offset[Axis::Primary], 0.0);
        assert!(!controller.is_active(Axis::Primary));
    }

    #[tokio::test]
    async fn second_pulse_on_same_axis_is_rejected_while_active() {
        let engine = Arc::new(Mutex::new(TrackingEngine::default()));
        let controller = Arc::new(GuideController::new(engine));
        let snapshot = Snapshot::default_for_tests();

        let c2 = controller.clone();
        let snap2 = snapshot.clone();
        let handle = tokio::spawn(async move {
            c2.pulse_guide(Axis::Primary, GuideDirection::Positive, 200, &snap2)
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let err = controller
            .pulse_guide(Axis::Primary, GuideDirection::Negative, 50, &snapshot)
            .await;
        assert!(err.is_err());

        controller.cancel(Axis::Primary);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn duration_below_minimum_is_rejected() {
        let engine = Arc::new(Mutex::new(TrackingEngine::default()));
        let controller = GuideController::new(engine);
        let mut snapshot = Snapshot::default_for_tests();
        snapshot.min_pulse_ms_ra = 50;

        let err = controller
            .pulse_guide(Axis::Primary, GuideDirection::Positive, 10, &snapshot)
            .await;
        assert!(err.is_err());
    }
}
