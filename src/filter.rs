// src/filter.rs - Scalar smoothing filters and their 2D composition
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// A stateful single-channel smoother, fed once per frame.
pub trait ScalarFilter {
    fn filter(&mut self, x: f64, timestamp: Option<f64>) -> f64;
}

/// A stateful position smoother, fed once per frame.
pub trait Filter2D {
    fn filter(&mut self, x: f64, y: f64, timestamp: Option<f64>) -> Vector2<f64>;
}

pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 14;

pub struct MovingAverageFilter {
    window: VecDeque<f64>,
    window_size: usize,
}

impl MovingAverageFilter {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn median(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

impl Default for MovingAverageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MOVING_AVERAGE_WINDOW)
    }
}

impl ScalarFilter for MovingAverageFilter {
    fn filter(&mut self, x: f64, _timestamp: Option<f64>) -> f64 {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(x);
        self.mean()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExponentialVariant {
    /// Blend the new sample into the estimate.
    Lowpass,
    /// Blend the previous raw sample into the estimate (one step behind).
    Predict,
}

pub struct SingleExponentialFilter {
    alpha: f64,
    variant: ExponentialVariant,
    last_x: Option<f64>,
    last_estimate: f64,
}

impl SingleExponentialFilter {
    pub fn new(alpha: f64, variant: ExponentialVariant) -> Self {
        Self {
            alpha,
            variant,
            last_x: None,
            last_estimate: 0.0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    /// Raw input of the previous call, if any.
    pub fn last_x(&self) -> Option<f64> {
        self.last_x
    }
}

impl Default for SingleExponentialFilter {
    fn default() -> Self {
        Self::new(0.01, ExponentialVariant::Predict)
    }
}

impl ScalarFilter for SingleExponentialFilter {
    fn filter(&mut self, x: f64, _timestamp: Option<f64>) -> f64 {
        self.last_estimate = match self.last_x {
            None => x,
            Some(last_x) => {
                let blended = match self.variant {
                    ExponentialVariant::Predict => last_x,
                    ExponentialVariant::Lowpass => x,
                };
                self.alpha * blended + (1.0 - self.alpha) * self.last_estimate
            }
        };
        self.last_x = Some(x);
        self.last_estimate
    }
}

pub struct DoubleExponentialFilter {
    alpha: f64,
    gamma: f64,
    last_estimate: Option<f64>,
    trend: f64,
}

impl DoubleExponentialFilter {
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            gamma: 0.01,
            last_estimate: None,
            trend: 0.0,
        }
    }
}

impl Default for DoubleExponentialFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarFilter for DoubleExponentialFilter {
    fn filter(&mut self, x: f64, _timestamp: Option<f64>) -> f64 {
        let estimate = match self.last_estimate {
            None => {
                self.trend = 0.0;
                x
            }
            Some(last) => {
                let s = self.alpha * x + (1.0 - self.alpha) * (last + self.trend);
                self.trend = self.gamma * (s - last) + (1.0 - self.gamma) * self.trend;
                s
            }
        };
        self.last_estimate = Some(estimate);
        estimate
    }
}

pub const ONE_EURO_DEFAULT_FREQUENCY: f64 = 25.0;

/// Adaptive low-pass filter: the cutoff rises with the estimated speed of
/// the signal, so slow jitter is smoothed hard while fast moves keep up.
pub struct OneEuroFilter {
    frequency: f64,
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x: SingleExponentialFilter,
    dx: SingleExponentialFilter,
    last_time: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        let frequency = ONE_EURO_DEFAULT_FREQUENCY;
        Self {
            frequency,
            min_cutoff,
            beta,
            d_cutoff,
            x: SingleExponentialFilter::new(
                alpha_for_cutoff(frequency, min_cutoff),
                ExponentialVariant::Lowpass,
            ),
            dx: SingleExponentialFilter::new(
                alpha_for_cutoff(frequency, d_cutoff),
                ExponentialVariant::Lowpass,
            ),
            last_time: None,
        }
    }

    /// Current sampling frequency estimate in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

impl Default for OneEuroFilter {
    fn default() -> Self {
        Self::new(1.0, 0.007, 1.0)
    }
}

impl ScalarFilter for OneEuroFilter {
    fn filter(&mut self, x: f64, timestamp: Option<f64>) -> f64 {
        if let (Some(last), Some(now)) = (self.last_time, timestamp) {
            // Out-of-order or repeated stamps keep the previous estimate.
            if now > last {
                self.frequency = 1.0 / (now - last);
            }
        }
        self.last_time = timestamp;

        let dx = match self.x.last_x() {
            Some(previous) => (x - previous) * self.frequency,
            None => 0.0,
        };
        self.dx.set_alpha(alpha_for_cutoff(self.frequency, self.d_cutoff));
        let edx = self.dx.filter(dx, None);

        let cutoff = self.min_cutoff + self.beta * edx.abs();
        self.x.set_alpha(alpha_for_cutoff(self.frequency, cutoff));
        self.x.filter(x, None)
    }
}

/// `alpha = 1 / (1 + tau / te)` with `te = 1 / frequency`, `tau = 1 / (2π cutoff)`.
pub fn alpha_for_cutoff(frequency: f64, cutoff: f64) -> f64 {
    let te = 1.0 / frequency;
    let tau = 1.0 / (2.0 * PI * cutoff);
    1.0 / (1.0 + tau / te)
}

/// Two independent same-type scalar filters, one per axis.
pub struct ComposedFilter2D<F: ScalarFilter> {
    x: F,
    y: F,
}

impl<F: ScalarFilter> ComposedFilter2D<F> {
    pub fn new(x: F, y: F) -> Self {
        Self { x, y }
    }
}

impl<F: ScalarFilter + Default> Default for ComposedFilter2D<F> {
    fn default() -> Self {
        Self::new(F::default(), F::default())
    }
}

impl<F: ScalarFilter> Filter2D for ComposedFilter2D<F> {
    fn filter(&mut self, x: f64, y: f64, timestamp: Option<f64>) -> Vector2<f64> {
        Vector2::new(self.x.filter(x, timestamp), self.y.filter(y, timestamp))
    }
}

/// Constant-velocity Kalman filter over a 2D position.
pub struct KalmanFilter2D {
    state: Vector4<f64>, // [x, y, vx, vy]
    covariance: Matrix4<f64>,
    process_noise: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
    dt: f64,
    last_time: Option<f64>,
    initialized: bool,
}

impl KalmanFilter2D {
    pub fn new() -> Self {
        let mut process_noise = Matrix4::identity() * 0.1;
        process_noise.fixed_view_mut::<2, 2>(2, 2).fill_diagonal(0.2);

        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity(),
            process_noise,
            measurement_noise: Matrix2::identity() * 0.1,
            dt: 1.0 / 30.0,
            last_time: None,
            initialized: false,
        }
    }

    pub fn predict(&mut self) {
        let mut f = Matrix4::identity();
        f.fixed_view_mut::<2, 2>(0, 2).fill_diagonal(self.dt);

        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;
    }

    pub fn update(&mut self, measurement: Vector2<f64>) {
        // H observes position only
        let mut h = Matrix2x4::<f64>::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;

        let innovation = measurement - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;
        let Some(s_inv) = s.try_inverse() else {
            tracing::warn!("singular innovation covariance, skipping kalman update");
            return;
        };
        let k = self.covariance * h.transpose() * s_inv;

        self.state += k * innovation;
        self.covariance = (Matrix4::identity() - k * h) * self.covariance;
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[2], self.state[3])
    }
}

impl Default for KalmanFilter2D {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter2D for KalmanFilter2D {
    fn filter(&mut self, x: f64, y: f64, timestamp: Option<f64>) -> Vector2<f64> {
        let measurement = Vector2::new(x, y);
        if !self.initialized {
            self.state = Vector4::new(x, y, 0.0, 0.0);
            self.initialized = true;
            self.last_time = timestamp;
            return measurement;
        }

        if let (Some(last), Some(now)) = (self.last_time, timestamp) {
            if now > last {
                self.dt = now - last;
            }
        }
        self.last_time = timestamp;

        self.predict();
        self.update(measurement);
        self.position()
    }
}

/// Which filter a smoothed channel uses, with its tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    MovingAverage { window: usize },
    SingleExponential { alpha: f64, variant: ExponentialVariant },
    DoubleExponential,
    OneEuro { min_cutoff: f64, beta: f64, d_cutoff: f64 },
    Kalman,
}

impl Default for FilterKind {
    fn default() -> Self {
        Self::OneEuro {
            min_cutoff: 1.0,
            beta: 0.007,
            d_cutoff: 1.0,
        }
    }
}

impl FilterKind {
    pub fn build_2d(&self) -> Box<dyn Filter2D> {
        match *self {
            FilterKind::MovingAverage { window } => Box::new(ComposedFilter2D::new(
                MovingAverageFilter::new(window),
                MovingAverageFilter::new(window),
            )),
            FilterKind::SingleExponential { alpha, variant } => Box::new(ComposedFilter2D::new(
                SingleExponentialFilter::new(alpha, variant),
                SingleExponentialFilter::new(alpha, variant),
            )),
            FilterKind::DoubleExponential => {
                Box::new(ComposedFilter2D::<DoubleExponentialFilter>::default())
            }
            FilterKind::OneEuro {
                min_cutoff,
                beta,
                d_cutoff,
            } => Box::new(ComposedFilter2D::new(
                OneEuroFilter::new(min_cutoff, beta, d_cutoff),
                OneEuroFilter::new(min_cutoff, beta, d_cutoff),
            )),
            FilterKind::Kalman => Box::new(KalmanFilter2D::new()),
        }
    }
}
