//! Visual Kalman filter: 7-state constant-velocity motion model
//! over box center, area, and aspect ratio.

use nalgebra::{Matrix4, Matrix4x7, Matrix7, Matrix7x4, Vector4, Vector7};
use vclip_models::NormalizedRect;

use super::error::{TrackingError, TrackingResult};

/// State vector layout: `(x, y, s, r, vx, vy, s_dot)`.
const STATE_DIM: usize = 7;
const MEAS_DIM: usize = 4;

/// 7-state linear Gauss-Markov filter: constant velocity in box center and
/// area, constant aspect ratio.
#[derive(Debug, Clone)]
pub struct VisualKalmanFilter {
    x: Vector7<f32>,
    p: Matrix7<f32>,
    q: Matrix7<f32>,
    r: Matrix4<f32>,
    dt: f32,
}

impl VisualKalmanFilter {
    /// Initialize from an observed rect at track creation time.
    pub fn from_rect(rect: &NormalizedRect, dt: f32) -> Self {
        let (cx, cy, s, ratio) = rect_to_state(rect);
        let mut x = Vector7::zeros();
        x[0] = cx;
        x[1] = cy;
        x[2] = s;
        x[3] = ratio;

        // Calibrated initial uncertainty: confident in position/shape,
        // uncertain in the unobserved velocity/growth terms.
        let mut p = Matrix7::identity() * 10.0;
        p[(4, 4)] = 1000.0;
        p[(5, 5)] = 1000.0;
        p[(6, 6)] = 1000.0;

        Self {
            x,
            p,
            q: default_process_noise(),
            r: default_measurement_noise(),
            dt,
        }
    }

    fn transition(&self) -> Matrix7<f32> {
        let mut a = Matrix7::identity();
        a[(0, 4)] = self.dt;
        a[(1, 5)] = self.dt;
        a[(2, 6)] = self.dt;
        a
    }

    /// Advance the filter one time step: `x <- A x`, `P <- A P Aᵀ + Q`.
    pub fn predict(&mut self) {
        let a = self.transition();
        self.x = a * self.x;
        self.p = a * self.p * a.transpose() + self.q;
    }

    /// Incorporate a measurement `(x, y, s, r)`. Silently no-ops if the
    /// innovation covariance is singular, surfacing
    /// `FilterSingularInnovation` so callers can log it.
    pub fn update(&mut self, rect: &NormalizedRect) -> TrackingResult<()> {
        let (cx, cy, s, ratio) = rect_to_state(rect);
        let z = Vector4::new(cx, cy, s, ratio);
        let h = measurement_matrix();

        let y = z - h * self.x;
        let s_cov = h * self.p * h.transpose() + self.r;

        let s_inv = match s_cov.try_inverse() {
            Some(inv) => inv,
            None => return Err(TrackingError::FilterSingularInnovation),
        };

        let k: Matrix7x4<f32> = self.p * h.transpose() * s_inv;
        self.x += k * y;
        self.p = (Matrix7::identity() - k * h) * self.p;
        Ok(())
    }

    /// Zero velocities and growth outright, as done on the ACTIVE->INACTIVE
    /// transition.
    pub fn zero_velocity_and_growth(&mut self) {
        self.x[4] = 0.0;
        self.x[5] = 0.0;
        self.x[6] = 0.0;
    }

    /// Damp velocities and growth by `velocity_damping^dt` /
    /// `growth_damping^dt`, as done on each non-transitioning miss while
    /// still ACTIVE.
    pub fn damp_velocity_and_growth(&mut self, velocity_damping: f32, growth_damping: f32) {
        let vel_factor = velocity_damping.powf(self.dt);
        let growth_factor = growth_damping.powf(self.dt);
        self.x[4] *= vel_factor;
        self.x[5] *= vel_factor;
        self.x[6] *= growth_factor;
    }

    /// Damp position and scale by the same multiplicative factors, applied
    /// once at the moment of ACTIVE->INACTIVE deactivation.
    pub fn damp_position_and_scale(&mut self, velocity_damping: f32, growth_damping: f32) {
        let vel_factor = velocity_damping.powf(self.dt);
        let growth_factor = growth_damping.powf(self.dt);
        self.x[0] *= vel_factor;
        self.x[1] *= vel_factor;
        self.x[2] *= growth_factor;
    }

    /// Current rect accessor: `width = sqrt(s*r)`, `height = sqrt(s/r)`.
    pub fn rect(&self) -> NormalizedRect {
        let (cx, cy, s, ratio) = (self.x[0], self.x[1], self.x[2], self.x[3]);
        let width = (s * ratio).sqrt();
        let height = (s / ratio).sqrt();
        NormalizedRect::new(
            (cx - width / 2.0) as f64,
            (cy - height / 2.0) as f64,
            width as f64,
            height as f64,
        )
    }

    /// Whether the current state describes a valid filter (`s > 0`, `r > 0`,
    /// no NaN in the derived rect width).
    pub fn is_valid(&self) -> bool {
        let r = self.rect();
        r.width.is_finite() && r.width > 0.0 && r.height.is_finite() && r.height > 0.0
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.x[4], self.x[5])
    }

    pub fn growth_rate(&self) -> f32 {
        self.x[6]
    }
}

fn rect_to_state(rect: &NormalizedRect) -> (f32, f32, f32, f32) {
    let cx = rect.mid_x() as f32;
    let cy = rect.mid_y() as f32;
    let s = (rect.width * rect.height) as f32;
    let ratio = (rect.width / rect.height) as f32;
    (cx, cy, s, ratio)
}

fn measurement_matrix() -> Matrix4x7<f32> {
    let mut h = Matrix4x7::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = 1.0;
    h[(2, 2)] = 1.0;
    h[(3, 3)] = 1.0;
    h
}

/// Fixed process noise, calibrated offline: small on position, larger on
/// the velocity/growth terms which are never directly observed.
fn default_process_noise() -> Matrix7<f32> {
    let mut q = Matrix7::identity() * 1.0;
    q[(4, 4)] = 0.01;
    q[(5, 5)] = 0.01;
    q[(6, 6)] = 0.0001;
    q
}

/// Fixed measurement noise, calibrated offline.
fn default_measurement_noise() -> Matrix4<f32> {
    let mut r = Matrix4::identity() * 1.0;
    r[(2, 2)] = 10.0;
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_round_trips_through_state() {
        let rect = NormalizedRect::new(0.4, 0.4, 0.2, 0.2);
        let kf = VisualKalmanFilter::from_rect(&rect, 1.0 / 30.0);
        let got = kf.rect();
        assert!((got.x - rect.x).abs() < 1e-4);
        assert!((got.width - rect.width).abs() < 1e-4);
    }

    #[test]
    fn predict_then_update_with_exact_measurement_is_bounded() {
        let rect = NormalizedRect::new(0.4, 0.4, 0.2, 0.2);
        let mut kf = VisualKalmanFilter::from_rect(&rect, 1.0 / 30.0);
        kf.predict();
        kf.update(&rect).unwrap();
        let got = kf.rect();
        // Bounded by O(dt * |v|); velocity is 0 at init, so drift must be tiny.
        assert!((got.mid_x() - rect.mid_x()).abs() < 0.05);
        assert!((got.mid_y() - rect.mid_y()).abs() < 0.05);
    }

    #[test]
    fn zero_velocity_and_growth_clears_velocity() {
        let rect = NormalizedRect::new(0.4, 0.4, 0.2, 0.2);
        let mut kf = VisualKalmanFilter::from_rect(&rect, 1.0 / 30.0);
        kf.zero_velocity_and_growth();
        assert_eq!(kf.velocity(), (0.0, 0.0));
        assert_eq!(kf.growth_rate(), 0.0);
    }

    #[test]
    fn valid_filter_has_positive_finite_rect() {
        let rect = NormalizedRect::new(0.4, 0.4, 0.2, 0.2);
        let kf = VisualKalmanFilter::from_rect(&rect, 1.0 / 30.0);
        assert!(kf.is_valid());
    }
}
