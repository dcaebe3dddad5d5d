pub mod association;
pub mod bev;
pub mod config;
pub mod error;
pub mod filter;
pub mod math;
pub mod measurement;
pub mod pointcloud;
pub mod range_image;
pub mod sensor;
pub mod track;

pub use association::{Association, AssociationMatrix};
pub use config::{AssociationConfig, BevConfig, Config, Device, FilterConfig};
pub use error::Error;
pub use filter::{Filter, KalmanFilter};
pub use measurement::Measurement;
pub use pointcloud::{Point, PointCloud};
pub use sensor::Sensor;
pub use track::{Track, TrackState};

/// Owner of the track list and of the track life cycle (creation, scoring,
/// deletion). The association engine only updates states through it.
pub trait TrackManagement {
    fn tracks(&self) -> &[Track];
    fn track_mut(&mut self, idx: usize) -> Option<&mut Track>;

    /// Called after the track at `idx` received a measurement update.
    fn handle_updated_track(&mut self, idx: usize);

    fn set_unassigned_tracks(&mut self, idx: Vec<usize>);
    fn set_unassigned_measurements(&mut self, idx: Vec<usize>);
    fn set_measurement_list(&mut self, measurements: Vec<Measurement>);

    /// Track maintenance pass, run once per association cycle.
    fn manage_tracks(&mut self);
}
