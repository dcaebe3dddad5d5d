use nalgebra as na;
use std::fmt;

/// Measurement model of one physical sensor.
///
/// Track state vectors are `[x, y, z, vx, vy, vz]` in vehicle coordinates;
/// every method only looks at the position part.
pub trait Sensor: fmt::Debug {
    fn name(&self) -> &str;

    /// Dimension of the measurement vector, which is also the number of
    /// degrees of freedom used for gating.
    fn dim_meas(&self) -> usize;

    /// Whether a state lies inside the sensor's field of view.
    fn in_fov(&self, x: &na::DVector<f64>) -> bool;

    /// Expected measurement for state `x`.
    fn hx(&self, x: &na::DVector<f64>) -> na::DVector<f64>;

    /// Jacobian of [`Sensor::hx`] with respect to the full state, evaluated at `x`.
    fn jacobian(&self, x: &na::DVector<f64>) -> na::DMatrix<f64>;

    /// Measurement noise covariance `R`.
    fn noise(&self) -> na::DMatrix<f64>;
}

/// Pose and azimuth opening angle of a sensor on the vehicle.
#[derive(Debug, Clone)]
pub struct Mounting {
    pub sens_to_veh: na::Matrix4<f64>,
    pub veh_to_sens: na::Matrix4<f64>,
    /// [min, max] azimuth in radians, measured in sensor coordinates
    pub fov: [f64; 2],
}

impl Mounting {
    /// Returns `None` if the transform can't be inverted.
    pub fn new(sens_to_veh: na::Matrix4<f64>, fov: [f64; 2]) -> Option<Self> {
        let veh_to_sens = sens_to_veh.try_inverse()?;

        Some(Self {
            sens_to_veh,
            veh_to_sens,
            fov,
        })
    }

    pub fn identity(fov: [f64; 2]) -> Self {
        Self {
            sens_to_veh: na::Matrix4::identity(),
            veh_to_sens: na::Matrix4::identity(),
            fov,
        }
    }

    #[inline]
    pub fn to_sensor(&self, x: &na::DVector<f64>) -> na::Vector3<f64> {
        let c = |i: usize| x.get(i).copied().unwrap_or(0.0);
        let pos = na::Vector4::new(c(0), c(1), c(2), 1.0);
        (self.veh_to_sens * pos).xyz()
    }

    #[inline]
    fn rotation(&self) -> na::Matrix3<f64> {
        self.veh_to_sens.fixed_slice::<3, 3>(0, 0).into_owned()
    }

    pub fn in_fov(&self, x: &na::DVector<f64>) -> bool {
        if x.len() < 3 {
            return false;
        }

        let p = self.to_sensor(x);
        let alpha = p.y.atan2(p.x);

        alpha >= self.fov[0] && alpha <= self.fov[1]
    }
}

#[derive(Debug, Clone)]
pub struct Lidar {
    pub mounting: Mounting,
    /// standard deviation per axis, metres
    pub sigma: [f64; 3],
}

impl Lidar {
    pub fn new(mounting: Mounting, sigma: [f64; 3]) -> Self {
        Self { mounting, sigma }
    }
}

impl Sensor for Lidar {
    fn name(&self) -> &str {
        "lidar"
    }

    #[inline]
    fn dim_meas(&self) -> usize {
        3
    }

    fn in_fov(&self, x: &na::DVector<f64>) -> bool {
        self.mounting.in_fov(x)
    }

    fn hx(&self, x: &na::DVector<f64>) -> na::DVector<f64> {
        let p = self.mounting.to_sensor(x);
        na::DVector::from_column_slice(p.as_slice())
    }

    fn jacobian(&self, x: &na::DVector<f64>) -> na::DMatrix<f64> {
        let r = self.mounting.rotation();

        let mut h = na::DMatrix::zeros(3, x.len());
        for k in 0..x.len().min(3) {
            for row in 0..3 {
                h[(row, k)] = r[(row, k)];
            }
        }

        h
    }

    fn noise(&self) -> na::DMatrix<f64> {
        let var = na::DVector::from_iterator(3, self.sigma.iter().map(|s| s * s));
        na::DMatrix::from_diagonal(&var)
    }
}

/// Pinhole camera observing the image coordinates `(i, j)` of a track.
#[derive(Debug, Clone)]
pub struct Camera {
    pub mounting: Mounting,
    pub f_i: f64,
    pub f_j: f64,
    pub c_i: f64,
    pub c_j: f64,
    /// standard deviation per image axis, pixels
    pub sigma: [f64; 2],
}

impl Camera {
    pub fn new(
        mounting: Mounting,
        focal: (f64, f64),
        principal: (f64, f64),
        sigma: [f64; 2],
    ) -> Self {
        Self {
            mounting,
            f_i: focal.0,
            f_j: focal.1,
            c_i: principal.0,
            c_j: principal.1,
            sigma,
        }
    }
}

impl Sensor for Camera {
    fn name(&self) -> &str {
        "camera"
    }

    #[inline]
    fn dim_meas(&self) -> usize {
        2
    }

    fn in_fov(&self, x: &na::DVector<f64>) -> bool {
        self.mounting.in_fov(x)
    }

    // A point on the image plane (p.x == 0) projects to infinity; the
    // resulting non-finite residual is rejected by the gate.
    fn hx(&self, x: &na::DVector<f64>) -> na::DVector<f64> {
        let p = self.mounting.to_sensor(x);

        na::DVector::from_vec(vec![
            self.c_i - self.f_i * p.y / p.x,
            self.c_j - self.f_j * p.z / p.x,
        ])
    }

    fn jacobian(&self, x: &na::DVector<f64>) -> na::DMatrix<f64> {
        let p = self.mounting.to_sensor(x);
        let r = self.mounting.rotation();
        let px2 = p.x * p.x;

        let mut h = na::DMatrix::zeros(2, x.len());
        for k in 0..x.len().min(3) {
            h[(0, k)] = -self.f_i * (r[(1, k)] * p.x - p.y * r[(0, k)]) / px2;
            h[(1, k)] = -self.f_j * (r[(2, k)] * p.x - p.z * r[(0, k)]) / px2;
        }

        h
    }

    fn noise(&self) -> na::DMatrix<f64> {
        let var = na::DVector::from_iterator(2, self.sigma.iter().map(|s| s * s));
        na::DMatrix::from_diagonal(&var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn state(x: f64, y: f64, z: f64) -> na::DVector<f64> {
        na::DVector::from_vec(vec![x, y, z, 0.0, 0.0, 0.0])
    }

    #[test]
    fn lidar_fov_is_azimuth_window() {
        let lidar = Lidar::new(Mounting::identity([-FRAC_PI_2, FRAC_PI_2]), [0.1; 3]);

        assert!(lidar.in_fov(&state(10.0, 0.0, 0.0)));
        assert!(lidar.in_fov(&state(1.0, 5.0, 0.0)));
        assert!(!lidar.in_fov(&state(-10.0, 0.0, 0.0)));
        assert!(!lidar.in_fov(&na::DVector::from_vec(vec![1.0])));
    }

    #[test]
    fn lidar_measures_position_in_sensor_frame() {
        let mut t = na::Matrix4::identity();
        t[(0, 3)] = 2.0;
        let lidar = Lidar::new(Mounting::new(t, [-1.0, 1.0]).unwrap(), [0.1; 3]);

        let x = state(5.0, 1.0, -1.0);
        let z = lidar.hx(&x);
        assert_relative_eq!(z[0], 3.0);
        assert_relative_eq!(z[1], 1.0);

        let h = lidar.jacobian(&x);
        assert_eq!(h.shape(), (3, 6));
        assert_relative_eq!(h[(0, 0)], 1.0);
        assert_relative_eq!(h[(2, 2)], 1.0);
        assert_relative_eq!(h[(0, 3)], 0.0);

        assert_relative_eq!(lidar.noise()[(1, 1)], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn camera_jacobian_matches_finite_difference() {
        let cam = Camera::new(
            Mounting::identity([-0.35, 0.35]),
            (2000.0, 2000.0),
            (960.0, 640.0),
            [5.0, 5.0],
        );
        let x = state(20.0, 1.5, 0.7);
        let h = cam.jacobian(&x);
        let eps = 1e-6;

        for k in 0..3 {
            let mut xp = x.clone();
            xp[k] += eps;
            let diff = (cam.hx(&xp) - cam.hx(&x)) / eps;
            assert_relative_eq!(h[(0, k)], diff[0], epsilon = 1e-3);
            assert_relative_eq!(h[(1, k)], diff[1], epsilon = 1e-3);
        }

        assert_eq!(cam.dim_meas(), 2);
    }
}
