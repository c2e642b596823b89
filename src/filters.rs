// Gaze smoothing: weighted moving average and per-axis Kalman filtering.
// Rule: a steady, slightly lagging point beats a jittery accurate one. Raw estimates
// carry micro-saccade jitter, and both filters trade responsiveness for stability.

use log::warn;

use crate::types::{EngineConfig, FilterStrategy, ScreenPoint};

/// Smooth one incoming sample given prior state.
pub trait Smoother {
    /// Returns `None` and leaves memory untouched when the input is not finite.
    fn smooth(&mut self, point: ScreenPoint) -> Option<ScreenPoint>;

    /// Forget all memory; the next sample passes through unchanged.
    fn reset(&mut self);
}

/// Exponentially decaying average. Memory depth is roughly `1 / (1 - weight)` samples.
#[derive(Debug, Clone)]
pub struct WeightedMovingAverage {
    weight: f64,
    previous: Option<ScreenPoint>,
}

impl WeightedMovingAverage {
    pub fn new(weight: f64) -> Self {
        WeightedMovingAverage {
            weight,
            previous: None,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

impl Default for WeightedMovingAverage {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl Smoother for WeightedMovingAverage {
    fn smooth(&mut self, point: ScreenPoint) -> Option<ScreenPoint> {
        if !point.is_finite() {
            return None;
        }

        let smoothed = match self.previous {
            None => point,
            Some(prev) => ScreenPoint::new(
                self.weight * prev.x + (1.0 - self.weight) * point.x,
                self.weight * prev.y + (1.0 - self.weight) * point.y,
            ),
        };

        // Compound on smoothed history, not on the raw input.
        self.previous = Some(smoothed);
        Some(smoothed)
    }

    fn reset(&mut self) {
        self.previous = None;
    }
}

/// Scalar position-only Kalman filter.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    process_noise: f64,
    measurement_noise: f64,
    error_covariance: f64,
    gain: f64,
    estimate: Option<f64>,
}

impl KalmanFilter {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        KalmanFilter {
            process_noise,
            measurement_noise,
            error_covariance: 1.0,
            gain: 0.0,
            estimate: None,
        }
    }

    /// Feed one measurement. Non-finite input is skipped.
    pub fn filter(&mut self, measurement: f64) -> Option<f64> {
        if !measurement.is_finite() {
            return None;
        }

        let Some(estimate) = self.estimate else {
            self.estimate = Some(measurement);
            return Some(measurement);
        };

        let prior = self.error_covariance + self.process_noise;
        self.gain = prior / (prior + self.measurement_noise);
        let next = estimate + self.gain * (measurement - estimate);
        self.error_covariance = (1.0 - self.gain) * prior;
        self.estimate = Some(next);

        Some(next)
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    /// Gain applied on the most recent update (0 before the second measurement).
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn error_covariance(&self) -> f64 {
        self.error_covariance
    }

    pub fn reset(&mut self) {
        self.estimate = None;
        self.error_covariance = 1.0;
        self.gain = 0.0;
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(0.001, 0.1)
    }
}

/// Two independent scalar Kalman filters, one per axis.
#[derive(Debug, Clone, Default)]
pub struct DualKalmanFilter {
    x: KalmanFilter,
    y: KalmanFilter,
}

impl DualKalmanFilter {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        DualKalmanFilter {
            x: KalmanFilter::new(process_noise, measurement_noise),
            y: KalmanFilter::new(process_noise, measurement_noise),
        }
    }

    pub fn x_axis(&self) -> &KalmanFilter {
        &self.x
    }

    pub fn y_axis(&self) -> &KalmanFilter {
        &self.y
    }
}

impl Smoother for DualKalmanFilter {
    fn smooth(&mut self, point: ScreenPoint) -> Option<ScreenPoint> {
        // Check both axes first so a half-valid sample cannot advance one filter.
        if !point.is_finite() {
            return None;
        }
        let x = self.x.filter(point.x)?;
        let y = self.y.filter(point.y)?;
        Some(ScreenPoint::new(x, y))
    }

    fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}

/// Smoothing strategy picked from configuration.
#[derive(Debug, Clone)]
pub enum SmoothingFilter {
    WeightedAverage(WeightedMovingAverage),
    Kalman(DualKalmanFilter),
}

impl SmoothingFilter {
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.filter_strategy {
            FilterStrategy::WeightedAverage => {
                SmoothingFilter::WeightedAverage(WeightedMovingAverage::new(config.weight))
            }
            FilterStrategy::Kalman => SmoothingFilter::Kalman(DualKalmanFilter::new(
                config.process_noise,
                config.measurement_noise,
            )),
        }
    }

    pub fn strategy(&self) -> FilterStrategy {
        match self {
            SmoothingFilter::WeightedAverage(_) => FilterStrategy::WeightedAverage,
            SmoothingFilter::Kalman(_) => FilterStrategy::Kalman,
        }
    }
}

impl Smoother for SmoothingFilter {
    fn smooth(&mut self, point: ScreenPoint) -> Option<ScreenPoint> {
        let smoothed = match self {
            SmoothingFilter::WeightedAverage(f) => f.smooth(point),
            SmoothingFilter::Kalman(f) => f.smooth(point),
        };
        if smoothed.is_none() {
            warn!("Rejected non-finite gaze sample ({}, {})", point.x, point.y);
        }
        smoothed
    }

    fn reset(&mut self) {
        match self {
            SmoothingFilter::WeightedAverage(f) => f.reset(),
            SmoothingFilter::Kalman(f) => f.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: ScreenPoint, b: ScreenPoint, tol: f64) -> bool {
        (a.x - b.x).abs() <= tol && (a.y - b.y).abs() <= tol
    }

    #[test]
    fn wma_first_sample_passes_through() {
        let mut wma = WeightedMovingAverage::new(0.8);
        let out = wma.smooth(ScreenPoint::new(120.0, 45.0)).unwrap();
        assert_eq!(out, ScreenPoint::new(120.0, 45.0));
    }

    #[test]
    fn wma_blends_with_smoothed_history() {
        let mut wma = WeightedMovingAverage::new(0.8);
        wma.smooth(ScreenPoint::new(0.0, 0.0));
        let second = wma.smooth(ScreenPoint::new(100.0, 50.0)).unwrap();
        assert!(close(second, ScreenPoint::new(20.0, 10.0), 1e-9));
        // Memory is the smoothed value 20, not the raw 100.
        let third = wma.smooth(ScreenPoint::new(100.0, 50.0)).unwrap();
        assert!(close(third, ScreenPoint::new(36.0, 18.0), 1e-9));
    }

    #[test]
    fn wma_rejects_nan_without_touching_memory() {
        let mut wma = WeightedMovingAverage::new(0.5);
        wma.smooth(ScreenPoint::new(10.0, 10.0));
        assert!(wma.smooth(ScreenPoint::new(f64::NAN, 3.0)).is_none());
        let next = wma.smooth(ScreenPoint::new(20.0, 20.0)).unwrap();
        assert!(close(next, ScreenPoint::new(15.0, 15.0), 1e-9));
    }

    #[test]
    fn kalman_first_measurement_seeds_estimate() {
        let mut kf = KalmanFilter::default();
        assert_eq!(kf.filter(42.0), Some(42.0));
        assert_eq!(kf.estimate(), Some(42.0));
        assert_eq!(kf.error_covariance(), 1.0);
    }

    #[test]
    fn kalman_update_matches_hand_computation() {
        let mut kf = KalmanFilter::new(0.001, 0.1);
        kf.filter(0.0);
        let out = kf.filter(10.0).unwrap();
        let prior = 1.0 + 0.001;
        let gain = prior / (prior + 0.1);
        assert!((out - gain * 10.0).abs() < 1e-12);
        assert!((kf.gain() - gain).abs() < 1e-12);
        assert!((kf.error_covariance() - (1.0 - gain) * prior).abs() < 1e-12);
    }

    #[test]
    fn kalman_gain_settles_below_one() {
        let mut kf = KalmanFilter::default();
        let mut gains = Vec::new();
        for _ in 0..500 {
            kf.filter(7.0);
            gains.push(kf.gain());
        }
        let last = gains[gains.len() - 1];
        let before = gains[gains.len() - 2];
        assert!(last < 1.0 && last > 0.0);
        assert!((last - before).abs() < 1e-6);
        assert!((kf.estimate().unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn kalman_reset_restores_initial_state() {
        let mut kf = KalmanFilter::default();
        kf.filter(1.0);
        kf.filter(5.0);
        kf.reset();
        assert_eq!(kf.estimate(), None);
        assert_eq!(kf.error_covariance(), 1.0);
        assert_eq!(kf.filter(-3.0), Some(-3.0));
    }

    #[test]
    fn dual_kalman_skips_half_finite_sample() {
        let mut dual = DualKalmanFilter::default();
        dual.smooth(ScreenPoint::new(1.0, 1.0));
        assert!(dual.smooth(ScreenPoint::new(5.0, f64::INFINITY)).is_none());
        assert_eq!(dual.x_axis().estimate(), Some(1.0));
        assert_eq!(dual.y_axis().estimate(), Some(1.0));
    }

    #[test]
    fn strategy_follows_config() {
        let mut config = EngineConfig::default();
        assert_eq!(
            SmoothingFilter::from_config(&config).strategy(),
            FilterStrategy::WeightedAverage
        );
        config.filter_strategy = FilterStrategy::Kalman;
        assert_eq!(
            SmoothingFilter::from_config(&config).strategy(),
            FilterStrategy::Kalman
        );
    }

    proptest! {
        #[test]
        fn wma_converges_to_constant_input(
            weight in 0.05f64..0.95,
            cx in -2000.0f64..2000.0,
            cy in -2000.0f64..2000.0,
            start_x in -2000.0f64..2000.0,
            start_y in -2000.0f64..2000.0,
        ) {
            let mut wma = WeightedMovingAverage::new(weight);
            wma.smooth(ScreenPoint::new(start_x, start_y));
            let mut out = ScreenPoint::default();
            for _ in 0..2000 {
                out = wma.smooth(ScreenPoint::new(cx, cy)).unwrap();
            }
            prop_assert!(close(out, ScreenPoint::new(cx, cy), 1e-6));
        }

        #[test]
        fn kalman_converges_to_constant_input(
            q in 0.0001f64..0.1,
            r in 0.01f64..1.0,
            c in -2000.0f64..2000.0,
            start in -2000.0f64..2000.0,
        ) {
            let mut kf = KalmanFilter::new(q, r);
            kf.filter(start);
            let mut out = start;
            for _ in 0..5000 {
                out = kf.filter(c).unwrap();
            }
            prop_assert!((out - c).abs() < 1e-6);
            prop_assert!(kf.gain() < 1.0);
        }

        #[test]
        fn reset_returns_next_input_unchanged(
            history in prop::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..50),
            next_x in -500.0f64..500.0,
            next_y in -500.0f64..500.0,
            kalman in any::<bool>(),
        ) {
            let config = EngineConfig {
                filter_strategy: if kalman { FilterStrategy::Kalman } else { FilterStrategy::WeightedAverage },
                ..Default::default()
            };
            let mut filter = SmoothingFilter::from_config(&config);
            for (x, y) in history {
                filter.smooth(ScreenPoint::new(x, y));
            }
            filter.reset();
            let out = filter.smooth(ScreenPoint::new(next_x, next_y)).unwrap();
            prop_assert_eq!(out, ScreenPoint::new(next_x, next_y));
        }
    }
}
