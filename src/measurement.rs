use nalgebra as na;
use std::rc::Rc;

use crate::error::Error;
use crate::sensor::Sensor;

/// One sensor observation. Cheap to clone, the sensor model is shared.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub t: f64, // in seconds
    pub z: na::DVector<f64>,
    pub sensor: Rc<dyn Sensor>,
}

impl Measurement {
    pub fn new(t: f64, z: na::DVector<f64>, sensor: Rc<dyn Sensor>) -> Result<Self, Error> {
        if z.len() != sensor.dim_meas() {
            return Err(Error::DimensionMismatch {
                expected: sensor.dim_meas(),
                actual: z.len(),
            });
        }

        Ok(Self { t, z, sensor })
    }

    #[inline]
    pub fn from_slice(t: f64, z: &[f64], sensor: Rc<dyn Sensor>) -> Result<Self, Error> {
        Self::new(t, na::DVector::from_column_slice(z), sensor)
    }

    /// Degrees of freedom of the observation space.
    #[inline(always)]
    pub fn dof(&self) -> usize {
        self.z.len()
    }
}
