use nalgebra as na;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Initialized,
    Tentative,
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,

    // [x, y, z, vx, vy, vz] in vehicle coordinates
    pub x: na::DVector<f64>,
    pub p: na::DMatrix<f64>,

    pub score: f64,
    pub state: TrackState,

    // timestamp of the last update, in seconds
    pub t: f64,
}

impl Track {
    pub fn new(id: u32, x: na::DVector<f64>, p: na::DMatrix<f64>) -> Self {
        Self {
            id,
            x,
            p,
            score: 0.0,
            state: TrackState::Initialized,
            t: 0.0,
        }
    }

    #[inline]
    pub fn position(&self) -> na::Point3<f64> {
        let c = |i: usize| self.x.get(i).copied().unwrap_or(0.0);
        na::Point3::new(c(0), c(1), c(2))
    }

    #[inline]
    pub fn dim_state(&self) -> usize {
        self.x.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_leading_state() {
        let t = Track::new(
            7,
            na::DVector::from_vec(vec![1.0, -2.0, 0.5, 3.0, 0.0, 0.0]),
            na::DMatrix::identity(6, 6),
        );

        assert_eq!(t.position(), na::Point3::new(1.0, -2.0, 0.5));
        assert_eq!(t.dim_state(), 6);
        assert_eq!(t.state, TrackState::Initialized);
    }
}
