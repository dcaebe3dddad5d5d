use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::config::BevConfig;
use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

impl Point {
    #[inline]
    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self { x, y, z, intensity }
    }

    #[inline(always)]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.intensity.is_finite()
    }

    /// Closed-interval containment test on all three coordinates.
    #[inline]
    pub fn within(&self, lim_x: [f32; 2], lim_y: [f32; 2], lim_z: [f32; 2]) -> bool {
        self.x >= lim_x[0]
            && self.x <= lim_x[1]
            && self.y >= lim_y[0]
            && self.y <= lim_y[1]
            && self.z >= lim_z[0]
            && self.z <= lim_z[1]
    }
}

/// Unordered lidar points of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point>,
}

impl PointCloud {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Reads an `N x 4+` array with columns `x, y, z, intensity`; further
    /// columns are ignored.
    pub fn from_array(arr: ArrayView2<'_, f32>) -> Result<Self, Error> {
        if arr.ncols() < 4 {
            return Err(Error::DimensionMismatch {
                expected: 4,
                actual: arr.ncols(),
            });
        }

        let points = arr
            .outer_iter()
            .map(|row| Point::new(row[0], row[1], row[2], row[3]))
            .collect();

        Ok(Self { points })
    }

    pub fn to_array(&self) -> Array2<f32> {
        let mut arr = Array2::zeros((self.points.len(), 4));
        for (mut row, p) in arr.outer_iter_mut().zip(self.points.iter()) {
            row.assign(&arr1(&[p.x, p.y, p.z, p.intensity]));
        }

        arr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}

impl FromIterator<Point> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Keeps the points inside the closed box `lim_x × lim_y × lim_z`.
/// Points with a non-finite coordinate or intensity are dropped as well.
pub fn crop(points: &PointCloud, lim_x: [f32; 2], lim_y: [f32; 2], lim_z: [f32; 2]) -> PointCloud {
    points
        .iter()
        .filter(|p| p.is_finite() && p.within(lim_x, lim_y, lim_z))
        .copied()
        .collect()
}

#[inline]
pub fn crop_point_cloud(points: &PointCloud, config: &BevConfig) -> PointCloud {
    crop(points, config.lim_x, config.lim_y, config.lim_z)
}
