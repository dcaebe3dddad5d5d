use nalgebra as na;

use crate::config::FilterConfig;
use crate::error::Error;
use crate::measurement::Measurement;
use crate::track::Track;

/// Estimator used by the association engine.
pub trait Filter {
    /// Residual `γ = z − h(x)` between measurement and predicted measurement.
    fn residual(&self, track: &Track, meas: &Measurement) -> na::DVector<f64>;

    /// Innovation covariance `S = H P Hᵀ + R` in measurement space.
    fn innovation_covariance(&self, track: &Track, meas: &Measurement) -> na::DMatrix<f64>;

    /// Measurement update of `track` with `meas`.
    fn update(&self, track: &mut Track, meas: &Measurement) -> Result<(), Error>;
}

const DIM_STATE: usize = 6;

/// Extended Kalman filter with a constant-velocity motion model.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    pub dt: f64,
    pub q: f64,
}

impl KalmanFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            dt: config.dt,
            q: config.q,
        })
    }

    /// State transition matrix
    pub fn f(&self) -> na::DMatrix<f64> {
        let mut f = na::DMatrix::identity(DIM_STATE, DIM_STATE);
        for i in 0..3 {
            f[(i, i + 3)] = self.dt;
        }

        f
    }

    /// Process noise covariance for piecewise constant white acceleration
    pub fn process_noise(&self) -> na::DMatrix<f64> {
        let dt = self.dt;
        let q1 = dt * self.q;
        let q2 = dt * dt / 2.0 * self.q;
        let q3 = dt * dt * dt / 3.0 * self.q;

        let mut q = na::DMatrix::zeros(DIM_STATE, DIM_STATE);
        for i in 0..3 {
            q[(i, i)] = q3;
            q[(i, i + 3)] = q2;
            q[(i + 3, i)] = q2;
            q[(i + 3, i + 3)] = q1;
        }

        q
    }

    fn check_dim(track: &Track) -> Result<(), Error> {
        if track.x.len() != DIM_STATE || track.p.shape() != (DIM_STATE, DIM_STATE) {
            return Err(Error::DimensionMismatch {
                expected: DIM_STATE,
                actual: track.x.len(),
            });
        }

        Ok(())
    }

    pub fn predict(&self, track: &mut Track) -> Result<(), Error> {
        Self::check_dim(track)?;

        let f = self.f();
        track.x = &f * &track.x;
        track.p = &f * &track.p * f.transpose() + self.process_noise();

        Ok(())
    }
}

impl Filter for KalmanFilter {
    fn residual(&self, track: &Track, meas: &Measurement) -> na::DVector<f64> {
        &meas.z - meas.sensor.hx(&track.x)
    }

    fn innovation_covariance(&self, track: &Track, meas: &Measurement) -> na::DMatrix<f64> {
        let h = meas.sensor.jacobian(&track.x);
        &h * &track.p * h.transpose() + meas.sensor.noise()
    }

    fn update(&self, track: &mut Track, meas: &Measurement) -> Result<(), Error> {
        Self::check_dim(track)?;

        let h = meas.sensor.jacobian(&track.x);
        let gamma = self.residual(track, meas);
        let s = self.innovation_covariance(track, meas);
        let s_inv = s.try_inverse().ok_or(Error::DegenerateGate)?;

        let k = &track.p * h.transpose() * s_inv;
        track.x = &track.x + &k * gamma;
        track.p = (na::DMatrix::identity(DIM_STATE, DIM_STATE) - &k * h) * &track.p;
        track.t = meas.t;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{Lidar, Mounting, Sensor};
    use approx::assert_relative_eq;
    use std::rc::Rc;

    fn lidar() -> Rc<dyn Sensor> {
        Rc::new(Lidar::new(Mounting::identity([-1.5, 1.5]), [0.1; 3]))
    }

    fn track() -> Track {
        Track::new(
            1,
            na::DVector::from_vec(vec![10.0, 0.0, 0.0, 1.0, 2.0, 0.0]),
            na::DMatrix::identity(6, 6),
        )
    }

    #[test]
    fn predict_moves_with_velocity() {
        let kf = KalmanFilter::new(&FilterConfig { dt: 0.5, q: 1.0 }).unwrap();
        let mut t = track();
        kf.predict(&mut t).unwrap();

        assert_relative_eq!(t.x[0], 10.5);
        assert_relative_eq!(t.x[1], 1.0);
        // P = F I Fᵀ + Q
        assert_relative_eq!(t.p[(0, 0)], 1.0 + 0.25 + 0.125 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(t.p[(0, 3)], 0.5 + 0.125, epsilon = 1e-12);
        assert_relative_eq!(t.p[(3, 3)], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn update_pulls_state_towards_measurement() {
        let kf = KalmanFilter::new(&FilterConfig::default()).unwrap();
        let mut t = track();
        let meas = Measurement::from_slice(1.0, &[11.0, 0.0, 0.0], lidar()).unwrap();

        let s = kf.innovation_covariance(&t, &meas);
        assert_relative_eq!(s[(0, 0)], 1.01, epsilon = 1e-12);

        kf.update(&mut t, &meas).unwrap();

        // K = 1 / 1.01 on the observed position
        assert_relative_eq!(t.x[0], 10.0 + 1.0 / 1.01, epsilon = 1e-9);
        assert_relative_eq!(t.p[(0, 0)], 1.0 - 1.0 / 1.01, epsilon = 1e-9);
        assert_relative_eq!(t.x[3], 1.0, epsilon = 1e-9);
        assert_relative_eq!(t.t, 1.0);
    }

    #[test]
    fn rejects_wrong_state_size() {
        let kf = KalmanFilter::new(&FilterConfig::default()).unwrap();
        let mut t = Track::new(1, na::DVector::zeros(4), na::DMatrix::identity(4, 4));

        assert!(matches!(kf.predict(&mut t), Err(Error::DimensionMismatch { .. })));
        assert!(KalmanFilter::new(&FilterConfig { dt: 0.0, q: 1.0 }).is_err());
    }
}
