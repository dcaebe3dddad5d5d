//! Single nearest neighbour association with Mahalanobis gating.
//!
//! [`Association::associate`] builds an [`AssociationMatrix`] holding the
//! squared Mahalanobis distance of every track/measurement pair, with
//! `+∞` for pairs outside the chi-square gate. The matrix is then resolved
//! greedily, closest pair first.

use std::collections::HashMap;

use nalgebra as na;
use tracing::{debug, trace, warn};

use crate::config::AssociationConfig;
use crate::error::Error;
use crate::filter::Filter;
use crate::math;
use crate::measurement::Measurement;
use crate::sensor::Sensor;
use crate::track::Track;
use crate::TrackManagement;

/// The minimum finite entry of an [`AssociationMatrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub row: usize,
    pub col: usize,
    /// index into the original track list
    pub track: usize,
    /// index into the original measurement list
    pub measurement: usize,
    pub distance: f64,
}

/// Working state of one association cycle.
///
/// Row `r` belongs to track `rows[r]`, column `c` to measurement `cols[c]`.
/// Rows and columns only ever get removed, so both stay in ascending order.
#[derive(Debug, Clone)]
pub struct AssociationMatrix {
    distances: na::DMatrix<f64>,
    rows: Vec<usize>,
    cols: Vec<usize>,
    unassigned_tracks: Vec<usize>,
    unassigned_measurements: Vec<usize>,
}

impl AssociationMatrix {
    /// Wraps precomputed distances; entry `(i, j)` scores track `i` against
    /// measurement `j`. Use `f64::INFINITY` for unlinkable pairs.
    pub fn from_distances(distances: na::DMatrix<f64>) -> Self {
        let (n_tracks, n_meas) = distances.shape();

        Self {
            distances,
            rows: (0..n_tracks).collect(),
            cols: (0..n_meas).collect(),
            unassigned_tracks: (0..n_tracks).collect(),
            unassigned_measurements: (0..n_meas).collect(),
        }
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.distances.shape()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.distances.nrows() == 0 || self.distances.ncols() == 0
    }

    #[inline]
    pub fn distances(&self) -> &na::DMatrix<f64> {
        &self.distances
    }

    /// Distance between a track and a measurement given by their original
    /// indices, if both are still in the matrix.
    pub fn get(&self, track: usize, measurement: usize) -> Option<f64> {
        let row = self.rows.binary_search(&track).ok()?;
        let col = self.cols.binary_search(&measurement).ok()?;

        Some(self.distances[(row, col)])
    }

    #[inline]
    pub fn unassigned_tracks(&self) -> &[usize] {
        &self.unassigned_tracks
    }

    #[inline]
    pub fn unassigned_measurements(&self) -> &[usize] {
        &self.unassigned_measurements
    }

    /// Smallest finite entry. Ties go to the lowest track index, then the
    /// lowest measurement index.
    pub fn peek_closest(&self) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;

        for row in 0..self.distances.nrows() {
            for col in 0..self.distances.ncols() {
                let distance = self.distances[(row, col)];
                if !distance.is_finite() {
                    continue;
                }

                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(Candidate {
                        row,
                        col,
                        track: self.rows[row],
                        measurement: self.cols[col],
                        distance,
                    });
                }
            }
        }

        best
    }

    fn remove_row(&mut self, row: usize) {
        let distances = std::mem::replace(&mut self.distances, na::DMatrix::zeros(0, 0));
        self.distances = distances.remove_row(row);
        self.rows.remove(row);
    }

    fn remove_col(&mut self, col: usize) {
        let distances = std::mem::replace(&mut self.distances, na::DMatrix::zeros(0, 0));
        self.distances = distances.remove_column(col);
        self.cols.remove(col);
    }

    /// Accepts `candidate`: drops its row and column and marks both sides
    /// as assigned.
    pub fn take(&mut self, candidate: &Candidate) {
        self.remove_row(candidate.row);
        self.remove_col(candidate.col);

        self.unassigned_tracks.retain(|&t| t != candidate.track);
        self.unassigned_measurements
            .retain(|&m| m != candidate.measurement);
    }

    /// Withdraws the candidate's track from this cycle, e.g. because the
    /// sensor cannot see it. The track is neither assigned nor reported as
    /// unassigned; the measurement stays available.
    pub fn skip_track(&mut self, candidate: &Candidate) {
        self.remove_row(candidate.row);
        self.unassigned_tracks.retain(|&t| t != candidate.track);
    }

    /// Drops the candidate's row but keeps the track on the unassigned list.
    pub fn reject_track(&mut self, candidate: &Candidate) {
        self.remove_row(candidate.row);
    }

    /// Pops the closest pair and returns its original `(track, measurement)`
    /// indices, or `None` when no finite entry is left.
    pub fn get_closest_track_and_measurement(&mut self) -> Option<(usize, usize)> {
        let candidate = self.peek_closest()?;
        self.take(&candidate);

        Some((candidate.track, candidate.measurement))
    }
}

pub struct Association {
    config: AssociationConfig,
}

impl Association {
    pub fn new(config: AssociationConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Chi-square gate threshold for `dof` degrees of freedom.
    #[inline]
    pub fn gate_threshold(&self, dof: usize) -> Option<f64> {
        math::chi2_quantile(self.config.gating_confidence, dof)
    }

    /// True if a squared Mahalanobis distance lies inside the gate of `sensor`.
    pub fn gating(&self, mhd: f64, sensor: &dyn Sensor) -> bool {
        self.gate_threshold(sensor.dim_meas())
            .map_or(false, |limit| mhd < limit)
    }

    /// Squared Mahalanobis distance between a track's predicted measurement
    /// and `meas`.
    pub fn mhd<F: Filter + ?Sized>(
        &self,
        track: &Track,
        meas: &Measurement,
        filter: &F,
    ) -> Result<f64, Error> {
        let gamma = filter.residual(track, meas);
        let s = filter.innovation_covariance(track, meas);

        math::mahalanobis_squared(&gamma, &s)
    }

    pub fn associate<F: Filter + ?Sized>(
        &self,
        tracks: &[Track],
        measurements: &[Measurement],
        filter: &F,
    ) -> AssociationMatrix {
        let mut thresholds: HashMap<usize, Option<f64>> = HashMap::new();

        let distances = na::DMatrix::from_fn(tracks.len(), measurements.len(), |r, c| {
            let track = &tracks[r];
            let meas = &measurements[c];

            let d2 = match self.mhd(track, meas, filter) {
                Ok(d2) => d2,
                Err(err) => {
                    warn!(track = track.id, measurement = c, "unlinkable pair: {}", err);
                    return f64::INFINITY;
                }
            };

            let dof = meas.sensor.dim_meas();
            let limit = *thresholds
                .entry(dof)
                .or_insert_with(|| self.gate_threshold(dof));

            match limit {
                Some(limit) if d2 < limit => d2,
                _ => f64::INFINITY,
            }
        });

        AssociationMatrix::from_distances(distances)
    }

    /// Runs one association cycle against the tracks of `manager` and hands
    /// the leftovers to its track management. Returns the resolved
    /// `(track, measurement)` pairs in resolution order.
    pub fn associate_and_update<M, F>(
        &self,
        manager: &mut M,
        measurements: &[Measurement],
        filter: &F,
    ) -> Vec<(usize, usize)>
    where
        M: TrackManagement + ?Sized,
        F: Filter + ?Sized,
    {
        let mut matrix = self.associate(manager.tracks(), measurements, filter);
        let mut resolved = Vec::new();

        while !matrix.is_empty() {
            let candidate = match matrix.peek_closest() {
                Some(c) => c,
                None => {
                    debug!("no more associations");
                    break;
                }
            };

            let meas = &measurements[candidate.measurement];
            let visible = manager
                .tracks()
                .get(candidate.track)
                .map_or(false, |t| meas.sensor.in_fov(&t.x));

            if !visible {
                trace!(
                    track = candidate.track,
                    sensor = meas.sensor.name(),
                    "track outside field of view"
                );
                matrix.skip_track(&candidate);
                continue;
            }

            let track = match manager.track_mut(candidate.track) {
                Some(track) => track,
                None => {
                    warn!(track = candidate.track, "track vanished from manager");
                    matrix.reject_track(&candidate);
                    continue;
                }
            };

            if let Err(err) = filter.update(track, meas) {
                warn!(track = track.id, "update failed: {}", err);
                matrix.reject_track(&candidate);
                continue;
            }

            debug!(
                "update track {} with {} measurement {}",
                track.id,
                meas.sensor.name(),
                candidate.measurement
            );

            matrix.take(&candidate);
            manager.handle_updated_track(candidate.track);
            resolved.push((candidate.track, candidate.measurement));
        }

        manager.set_unassigned_tracks(matrix.unassigned_tracks().to_vec());
        manager.set_unassigned_measurements(matrix.unassigned_measurements().to_vec());
        manager.set_measurement_list(measurements.to_vec());
        manager.manage_tracks();

        resolved
    }
}
