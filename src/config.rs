use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Where the assembled BEV tensor is meant to live. The rasterizer itself
/// never moves data; the value is handed to the [`crate::bev::BevSink`].
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

/// Detection area and raster size of the bird's-eye view.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BevConfig {
    /// [min, max] in metres
    pub lim_x: [f32; 2],
    pub lim_y: [f32; 2],
    pub lim_z: [f32; 2],
    pub bev_height: usize,
    pub bev_width: usize,
    pub device: Device,
}

impl BevConfig {
    pub fn new(
        lim_x: [f32; 2],
        lim_y: [f32; 2],
        lim_z: [f32; 2],
        height: usize,
        width: usize,
    ) -> Self {
        Self {
            lim_x,
            lim_y,
            lim_z,
            bev_height: height,
            bev_width: width,
            device: Device::Cpu,
        }
    }

    /// Metric edge length of one BEV cell.
    #[inline]
    pub fn cell_size(&self) -> f32 {
        (self.lim_x[1] - self.lim_x[0]) / self.bev_height as f32
    }

    #[inline]
    pub fn z_span(&self) -> f32 {
        (self.lim_z[1] - self.lim_z[0]).abs()
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (name, lim) in [("lim_x", self.lim_x), ("lim_y", self.lim_y), ("lim_z", self.lim_z)] {
            if !(lim[0].is_finite() && lim[1].is_finite()) || lim[0] > lim[1] {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a finite [min, max] pair, got {:?}",
                    name, lim
                )));
            }
        }

        if self.bev_height == 0 || self.bev_width == 0 {
            return Err(Error::InvalidConfig(format!(
                "bev size must be non-zero, got {}x{}",
                self.bev_height, self.bev_width
            )));
        }

        if self.lim_x[1] <= self.lim_x[0] {
            return Err(Error::InvalidConfig("lim_x must have a positive extent".into()));
        }

        Ok(())
    }
}

impl Default for BevConfig {
    fn default() -> Self {
        Self::new([0.0, 50.0], [-25.0, 25.0], [-1.0, 3.0], 608, 608)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AssociationConfig {
    /// Probability mass of the chi-square gate, e.g. 0.995
    pub gating_confidence: f64,
}

impl AssociationConfig {
    pub fn new(gating_confidence: f64) -> Self {
        Self { gating_confidence }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.gating_confidence > 0.0 && self.gating_confidence < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "gating_confidence must lie in (0, 1), got {}",
                self.gating_confidence
            )));
        }

        Ok(())
    }
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self::new(0.995)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Time increment in seconds
    pub dt: f64,
    /// Process noise intensity
    pub q: f64,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(Error::InvalidConfig(format!("dt must be positive, got {}", self.dt)));
        }

        if self.q < 0.0 || !self.q.is_finite() {
            return Err(Error::InvalidConfig(format!("q must be non-negative, got {}", self.q)));
        }

        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { dt: 0.1, q: 3.0 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bev: BevConfig,
    pub association: AssociationConfig,
    pub filter: FilterConfig,
}

impl Config {
    pub fn from_json_str(src: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(src)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.bev.validate()?;
        self.association.validate()?;
        self.filter.validate()
    }
}
