//! Bird's-eye view rasterization of a lidar point cloud.
//!
//! The output is a `1 x 3 x H x W` array with the channels
//! `[intensity, height, density]`, i.e. the blue, green and red planes of
//! the BGR image the detector was trained on.

use ndarray::prelude::*;
use tracing::trace;

use crate::config::{BevConfig, Device};
use crate::error::Error;
use crate::math;
use crate::pointcloud::{crop_point_cloud, PointCloud};

pub type BevMap = Array4<f32>;

pub const INTENSITY_CHANNEL: usize = 0;
pub const HEIGHT_CHANNEL: usize = 1;
pub const DENSITY_CHANNEL: usize = 2;

const INTENSITY_PERCENTILE: f64 = 90.0;
const DENSITY_SATURATION: f32 = 64.0;

/// A point mapped to its BEV cell. `z` is relative to `lim_z[0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BevPoint {
    pub row: usize,
    pub col: usize,
    pub z: f32,
    pub intensity: f32,
}

/// Consumer of assembled BEV maps, e.g. a detector input queue that moves
/// the tensor onto `device`.
pub trait BevSink {
    fn consume(&mut self, bev: BevMap, device: Device) -> Result<(), Error>;
}

impl BevSink for Vec<BevMap> {
    fn consume(&mut self, bev: BevMap, _device: Device) -> Result<(), Error> {
        self.push(bev);
        Ok(())
    }
}

/// Crops `points` to the detection area and maps x/y to grid cells.
/// Points landing outside `[0, H) x [0, W)` are skipped; the input order of
/// the remaining points is kept.
pub fn discretize(points: &PointCloud, config: &BevConfig) -> Vec<BevPoint> {
    let cropped = crop_point_cloud(points, config);
    let cell = config.cell_size();
    let height = config.bev_height as i64;
    let width = config.bev_width as i64;
    let col_offset = (width + 1) / 2;

    let discrete: Vec<BevPoint> = cropped
        .iter()
        .filter_map(|p| {
            let row = (p.x / cell).floor() as i64;
            let col = (p.y / cell).floor() as i64 + col_offset;

            if row < 0 || row >= height || col < 0 || col >= width {
                return None;
            }

            Some(BevPoint {
                row: row as usize,
                col: col as usize,
                z: p.z - config.lim_z[0],
                intensity: p.intensity,
            })
        })
        .collect();

    trace!(
        input = points.len(),
        cropped = cropped.len(),
        discretized = discrete.len(),
        "discretized point cloud"
    );

    discrete
}

#[inline]
fn empty_map(config: &BevConfig) -> Array2<f32> {
    Array2::zeros((config.bev_height, config.bev_width))
}

/// Keeps the largest `value` per cell, first point wins on ties. Points
/// outside the grid are skipped.
fn top_per_cell<F>(points: &[BevPoint], config: &BevConfig, value: F) -> Array2<f32>
where
    F: Fn(&BevPoint) -> f32,
{
    let mut top = Array2::from_elem((config.bev_height, config.bev_width), f32::NEG_INFINITY);

    for p in points {
        let v = value(p);
        if let Some(cell) = top.get_mut([p.row, p.col]) {
            if v > *cell {
                *cell = v;
            }
        }
    }

    top
}

/// Highest intensity per cell (clipped to 1.0), normalized by the 90th
/// percentile of the per-cell maxima and clamped to `[0, 1]`.
pub fn intensity_map(points: &[BevPoint], config: &BevConfig) -> Array2<f32> {
    let top = top_per_cell(points, config, |p| p.intensity.min(1.0));
    let kept: Vec<f32> = top.iter().copied().filter(|v| v.is_finite()).collect();

    let scale = match math::percentile(&kept, INTENSITY_PERCENTILE) {
        Some(scale) if scale > 0.0 => scale,
        _ => return empty_map(config),
    };

    top.mapv(|v| if v.is_finite() { (v / scale).clamp(0.0, 1.0) } else { 0.0 })
}

/// Highest point per cell, as a fraction of the configured z range.
pub fn height_map(points: &[BevPoint], config: &BevConfig) -> Array2<f32> {
    let span = config.z_span();
    if span <= 0.0 {
        return empty_map(config);
    }

    top_per_cell(points, config, |p| p.z)
        .mapv(|v| if v.is_finite() { (v / span).clamp(0.0, 1.0) } else { 0.0 })
}

/// Number of points per cell on a saturating log scale,
/// `min(1, ln(n + 1) / ln 64)`.
pub fn density_map(points: &[BevPoint], config: &BevConfig) -> Array2<f32> {
    let mut counts = Array2::<u32>::zeros((config.bev_height, config.bev_width));
    for p in points {
        if let Some(n) = counts.get_mut([p.row, p.col]) {
            *n += 1;
        }
    }

    counts.mapv(normalized_density)
}

#[inline]
pub fn normalized_density(count: u32) -> f32 {
    (((count as f32) + 1.0).ln() / DENSITY_SATURATION.ln()).min(1.0)
}

/// Stacks the three channels into a `1 x 3 x height x width` map. Larger
/// channels are cropped, smaller ones zero padded.
pub fn assemble<'a>(
    density: ArrayView2<'a, f32>,
    intensity: ArrayView2<'a, f32>,
    height: ArrayView2<'a, f32>,
    bev_height: usize,
    bev_width: usize,
) -> BevMap {
    let mut bev = Array4::zeros((1, 3, bev_height, bev_width));

    for (channel, map) in [
        (INTENSITY_CHANNEL, intensity),
        (HEIGHT_CHANNEL, height),
        (DENSITY_CHANNEL, density),
    ] {
        let rows = map.nrows().min(bev_height);
        let cols = map.ncols().min(bev_width);

        bev.slice_mut(s![0, channel, ..rows, ..cols])
            .assign(&map.slice(s![..rows, ..cols]));
    }

    bev
}

/// Full pipeline: discretize, build the three channels and assemble them.
pub fn bev_from_pcl(points: &PointCloud, config: &BevConfig) -> Result<BevMap, Error> {
    config.validate()?;

    let discrete = discretize(points, config);
    let intensity = intensity_map(&discrete, config);
    let height = height_map(&discrete, config);
    let density = density_map(&discrete, config);

    Ok(assemble(
        density.view(),
        intensity.view(),
        height.view(),
        config.bev_height,
        config.bev_width,
    ))
}

/// Rasterizes `points` and hands the result to `sink` together with the
/// configured device.
pub fn rasterize<S: BevSink + ?Sized>(
    points: &PointCloud,
    config: &BevConfig,
    sink: &mut S,
) -> Result<(), Error> {
    let bev = bev_from_pcl(points, config)?;
    sink.consume(bev, config.device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::Point;
    use approx::assert_relative_eq;

    fn config() -> BevConfig {
        // 1 m cells, 10 x 10 grid
        BevConfig::new([0.0, 10.0], [-5.0, 5.0], [-1.0, 3.0], 10, 10)
    }

    #[test]
    fn discretize_maps_to_cells() {
        let pcl = PointCloud::new(vec![
            Point::new(0.5, 0.2, 0.0, 0.3),
            Point::new(9.9, -4.9, 3.0, 0.3),
            Point::new(3.0, 4.9, -1.0, 0.3),
        ]);
        let d = discretize(&pcl, &config());

        assert_eq!(d.len(), 3);
        assert_eq!((d[0].row, d[0].col), (0, 5));
        assert_relative_eq!(d[0].z, 1.0);
        assert_eq!((d[1].row, d[1].col), (9, 0));
        assert_relative_eq!(d[1].z, 4.0);
        assert_eq!((d[2].row, d[2].col), (3, 9));
        assert_relative_eq!(d[2].z, 0.0);
    }

    #[test]
    fn discretize_skips_out_of_range_cells() {
        // x = 10 is inside the crop box but maps to row 10
        let pcl = PointCloud::new(vec![
            Point::new(10.0, 0.0, 0.0, 0.5),
            Point::new(5.0, 5.0, 0.0, 0.5),
        ]);
        let d = discretize(&pcl, &config());

        assert!(d.is_empty());
    }

    #[test]
    fn intensity_keeps_brightest_point() {
        let pcl = PointCloud::new(vec![
            Point::new(1.5, 0.5, 0.0, 0.2),
            Point::new(1.6, 0.6, 0.0, 0.9),
            Point::new(3.5, 0.5, 0.0, 1.0),
        ]);
        let d = discretize(&pcl, &config());
        let map = intensity_map(&d, &config());

        // kept values [0.9, 1.0], 90th percentile 0.99
        assert_relative_eq!(map[[1, 5]], 0.9 / 0.99, epsilon = 1e-5);
        assert_relative_eq!(map[[3, 5]], 1.0);
        assert_eq!(map.iter().filter(|&&v| v > 0.0).count(), 2);
    }

    #[test]
    fn intensity_normalized_by_percentile() {
        let pts: Vec<Point> = (0..10)
            .map(|i| Point::new(i as f32 + 0.5, 0.5, 0.0, 0.1 * (i + 1) as f32))
            .chain(std::iter::once(Point::new(0.5, 0.5, 0.0, 7.0)))
            .collect();
        let d = discretize(&PointCloud::new(pts), &config());
        let map = intensity_map(&d, &config());

        // kept: 0.2..=1.0 plus the clipped 1.0 in row 0; p90 = 1.0
        assert_relative_eq!(map[[0, 5]], 1.0);
        assert_relative_eq!(map[[1, 5]], 0.2, epsilon = 1e-6);
        assert_relative_eq!(map[[4, 5]], 0.5, epsilon = 1e-6);
        assert!(map.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn height_keeps_highest_point() {
        let pcl = PointCloud::new(vec![
            Point::new(2.5, -0.5, 2.0, 0.1),
            Point::new(2.5, -0.5, 0.0, 0.9),
        ]);
        let d = discretize(&pcl, &config());
        let map = height_map(&d, &config());

        assert_relative_eq!(map[[2, 4]], 0.75);
    }

    #[test]
    fn density_saturates() {
        assert_relative_eq!(normalized_density(0), 0.0);
        assert_relative_eq!(normalized_density(1), 2f32.ln() / 64f32.ln());
        assert_relative_eq!(normalized_density(63), 1.0);
        assert_relative_eq!(normalized_density(500), 1.0);

        let pts = vec![Point::new(1.5, 0.5, 0.0, 0.1); 3];
        let d = discretize(&PointCloud::new(pts), &config());
        let map = density_map(&d, &config());
        assert_relative_eq!(map[[1, 5]], 4f32.ln() / 64f32.ln());
    }

    #[test]
    fn builders_skip_points_outside_grid() {
        let small = BevConfig::new([0.0, 4.0], [-2.0, 2.0], [-1.0, 3.0], 4, 4);
        let at = |row, col, z, intensity| BevPoint {
            row,
            col,
            z,
            intensity,
        };
        let points = [at(7, 1, 1.0, 0.5), at(1, 4, 1.0, 0.5), at(2, 2, 2.0, 0.8)];

        let density = density_map(&points, &small);
        let height = height_map(&points, &small);
        let intensity = intensity_map(&points, &small);

        assert_eq!(density.shape(), &[4, 4]);
        assert_eq!(density.iter().filter(|&&v| v > 0.0).count(), 1);
        assert_relative_eq!(density[[2, 2]], 2f32.ln() / 64f32.ln());
        assert_relative_eq!(height[[2, 2]], 0.5);
        assert_relative_eq!(intensity[[2, 2]], 1.0);
        assert_eq!(intensity.iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn assemble_crops_and_pads() {
        let big = Array2::from_elem((12, 12), 0.5f32);
        let small = Array2::from_elem((4, 4), 0.25f32);
        let bev = assemble(big.view(), small.view(), big.view(), 10, 8);

        assert_eq!(bev.shape(), &[1, 3, 10, 8]);
        assert_relative_eq!(bev[[0, DENSITY_CHANNEL, 9, 7]], 0.5);
        assert_relative_eq!(bev[[0, INTENSITY_CHANNEL, 3, 3]], 0.25);
        assert_relative_eq!(bev[[0, INTENSITY_CHANNEL, 4, 4]], 0.0);
    }

    #[test]
    fn empty_cloud_gives_zero_map() {
        let bev = bev_from_pcl(&PointCloud::default(), &config()).unwrap();

        assert_eq!(bev.shape(), &[1, 3, 10, 10]);
        assert!(bev.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rasterize_feeds_sink() {
        let mut sink: Vec<BevMap> = Vec::new();
        let pcl = PointCloud::new(vec![Point::new(1.5, 0.5, 1.0, 0.4)]);

        rasterize(&pcl, &config(), &mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert_relative_eq!(sink[0][[0, HEIGHT_CHANNEL, 1, 5]], 0.5);

        let mut bad = config();
        bad.bev_width = 0;
        assert!(rasterize(&pcl, &bad, &mut sink).is_err());
    }
}
