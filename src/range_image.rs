//! 8-bit previews of a decoded lidar range image.
//!
//! A range image is an `H x W x C` array; the channel layout follows
//! [`RangeChannel`].

use ndarray::prelude::*;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeChannel {
    Range = 0,
    Intensity = 1,
    Elongation = 2,
    IsInNoLabelZone = 3,
}

fn min_max(img: &Array2<f32>) -> (f32, f32) {
    img.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

/// Extracts one channel and scales it to `u8`. Negative entries (no return)
/// are zeroed first. Range is stretched over the value span, intensity gets
/// a contrast adjustment around half its maximum; other channels are cast
/// as-is. Values beyond 255 saturate.
pub fn channel_to_8bit(
    range_image: ArrayView3<'_, f32>,
    channel: RangeChannel,
) -> Result<Array2<u8>, Error> {
    let idx = channel as usize;
    let n_channels = range_image.shape()[2];
    if idx >= n_channels {
        return Err(Error::DimensionMismatch {
            expected: idx + 1,
            actual: n_channels,
        });
    }

    let img = range_image
        .index_axis(Axis(2), idx)
        .mapv(|v| if v < 0.0 { 0.0 } else { v });

    if img.is_empty() {
        return Ok(Array2::zeros(img.raw_dim()));
    }

    let (lo, hi) = min_max(&img);
    let span = hi - lo;

    let scaled = match channel {
        RangeChannel::Range if span > 0.0 => img.mapv(|v| v * 255.0 / span),
        RangeChannel::Intensity if span > 0.0 => img.mapv(|v| hi / 2.0 * v * 255.0 / span),
        RangeChannel::Range | RangeChannel::Intensity => Array2::zeros(img.raw_dim()),
        _ => img,
    };

    Ok(scaled.mapv(|v| v as u8))
}

/// Keeps the central `2 * width / division` columns.
pub fn crop_azimuth<T: Clone>(img: ArrayView2<'_, T>, division: usize) -> Result<Array2<T>, Error> {
    if division == 0 {
        return Err(Error::InvalidConfig("azimuth division must be non-zero".into()));
    }

    let width = img.ncols();
    let opening = width / division;
    let center = width / 2;
    let start = center.saturating_sub(opening);
    let end = (center + opening).min(width);

    Ok(img.slice(s![.., start..end]).to_owned())
}

/// Range channel stacked on top of the intensity channel.
pub fn range_intensity_image(range_image: ArrayView3<'_, f32>) -> Result<Array2<u8>, Error> {
    let range = channel_to_8bit(range_image, RangeChannel::Range)?;
    let intensity = channel_to_8bit(range_image, RangeChannel::Intensity)?;

    ndarray::concatenate(Axis(0), &[range.view(), intensity.view()]).map_err(|_| {
        Error::DimensionMismatch {
            expected: range.ncols(),
            actual: intensity.ncols(),
        }
    })
}
