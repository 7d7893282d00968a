// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Apply a distortion map to raw images and crop them to the valid region.
//!
//! The expensive part of a remap, finding which raw pixels contribute to
//! each undistorted pixel and with which weights, only depends on the map.
//! It is computed once by [`Remapper::new`] and reused for every frame.

use image::{imageops, RgbImage};
use itertools::izip;
use serde::Deserialize;

use crate::core::distortion_map::DistortionMap;
use crate::misc::type_aliases::Float;
use crate::{Error, Result};

/// Sampling strategy for fractional source coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Closest raw pixel.
    Nearest,
    /// Weighted mean of the four surrounding raw pixels.
    #[default]
    Bilinear,
}

/// Precomputed sampling of one destination pixel.
///
/// The four contributing raw pixels are
/// `index`, `index + right`, `index + down` and `index + right + down`,
/// with `right` and `down` set to 0 on the last column and row
/// so that sampling never leaves the raw image.
#[derive(Clone, Copy, Debug)]
struct Tap {
    index: u32,
    right: u32,
    down: u32,
    a: Float,
    b: Float,
}

/// Lookup structure derived from a `DistortionMap`, reused across frames.
#[derive(Debug, Clone)]
pub struct Remapper {
    width: usize,
    height: usize,
    source_width: usize,
    source_height: usize,
    taps: Vec<Option<Tap>>,
}

impl Remapper {
    /// Precompute the sampling of every valid destination pixel.
    pub fn new(map: &DistortionMap, interpolation: Interpolation) -> Self {
        let (source_width, source_height) = map.source_size();
        let taps = map
            .mapping()
            .iter()
            .zip(map.mask())
            .map(|(p, &valid)| {
                if !valid {
                    return None;
                }
                let (x, y) = match interpolation {
                    Interpolation::Nearest => (p.x.round(), p.y.round()),
                    Interpolation::Bilinear => (p.x, p.y),
                };
                // Valid coordinates are in [0, size), rounding may reach size.
                let u = (x.floor() as usize).min(source_width - 1);
                let v = (y.floor() as usize).min(source_height - 1);
                let right = if u + 1 < source_width { 1 } else { 0 };
                let down = if v + 1 < source_height { source_width } else { 0 };
                Some(Tap {
                    index: (v * source_width + u) as u32,
                    right,
                    down: down as u32,
                    a: (x - u as Float).max(0.0).min(1.0),
                    b: (y - v as Float).max(0.0).min(1.0),
                })
            })
            .collect();
        Self {
            width: map.width(),
            height: map.height(),
            source_width,
            source_height,
            taps,
        }
    }

    /// Remap a raw image. Invalid pixels are black.
    pub fn apply(&self, raw: &RgbImage) -> Result<RgbImage> {
        let (raw_w, raw_h) = raw.dimensions();
        if (raw_w as usize, raw_h as usize) != (self.source_width, self.source_height) {
            return Err(Error::Configuration(format!(
                "raw image is {}x{} but the distortion map expects {}x{}",
                raw_w, raw_h, self.source_width, self.source_height
            )));
        }
        let src = raw.as_raw();
        let mut out = vec![0_u8; 3 * self.width * self.height];
        for (tap, pixel) in izip!(&self.taps, out.chunks_exact_mut(3)) {
            if let Some(tap) = tap {
                let i00 = 3 * tap.index as usize;
                let i01 = i00 + 3 * tap.right as usize;
                let i10 = i00 + 3 * tap.down as usize;
                let i11 = i10 + 3 * tap.right as usize;
                let (a, b) = (tap.a, tap.b);
                for (c, value) in pixel.iter_mut().enumerate() {
                    let top = (1.0 - a) * src[i00 + c] as Float + a * src[i01 + c] as Float;
                    let bottom = (1.0 - a) * src[i10 + c] as Float + a * src[i11 + c] as Float;
                    *value = ((1.0 - b) * top + b * bottom).round().min(255.0) as u8;
                }
            }
        }
        RgbImage::from_raw(self.width as u32, self.height as u32, out)
            .ok_or_else(|| Error::Configuration("remapped buffer has a wrong size".to_string()))
    }
}

/// Undistort a single raw image.
///
/// Prefer building a `Remapper` once when processing a whole sequence.
pub fn undistort(
    raw: &RgbImage,
    map: &DistortionMap,
    interpolation: Interpolation,
) -> Result<RgbImage> {
    Remapper::new(map, interpolation).apply(raw)
}

/// Axis-aligned rectangle of an undistorted image that is backed by sensor data.
///
/// Crops use `[x_min, x_max) x [y_min, y_max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidRegion {
    /// First valid column of the middle row.
    pub x_min: usize,
    /// Last valid column of the middle row.
    pub x_max: usize,
    /// First valid row of the middle column.
    pub y_min: usize,
    /// Last valid row of the middle column.
    pub y_max: usize,
}

impl ValidRegion {
    /// Scan the middle row and the middle column of a row-major mask.
    ///
    /// This approximates a convex valid area with a rectangle.
    /// It is not a tight bound: corners of the rectangle may fall
    /// outside of the valid area when it is strongly curved.
    pub fn from_mask(mask: &[bool], width: usize, height: usize) -> std::result::Result<Self, String> {
        if width == 0 || height == 0 || mask.len() != width * height {
            return Err(format!(
                "mask of {} values does not match a {}x{} image",
                mask.len(),
                width,
                height
            ));
        }
        let mid_row = &mask[(height / 2) * width..(height / 2 + 1) * width];
        let mid_col: Vec<bool> = (0..height).map(|row| mask[row * width + width / 2]).collect();
        let (x_min, x_max) = valid_bounds(mid_row)
            .ok_or_else(|| "no valid pixel in the middle row".to_string())?;
        let (y_min, y_max) = valid_bounds(&mid_col)
            .ok_or_else(|| "no valid pixel in the middle column".to_string())?;
        if x_min >= x_max || y_min >= y_max {
            return Err(format!(
                "degenerate valid region x: [{}, {}), y: [{}, {})",
                x_min, x_max, y_min, y_max
            ));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// Width of the cropped images.
    pub fn width(&self) -> usize {
        self.x_max - self.x_min
    }

    /// Height of the cropped images.
    pub fn height(&self) -> usize {
        self.y_max - self.y_min
    }

    /// Copy the region out of an undistorted image.
    pub fn crop(&self, img: &RgbImage) -> RgbImage {
        imageops::crop_imm(
            img,
            self.x_min as u32,
            self.y_min as u32,
            self.width() as u32,
            self.height() as u32,
        )
        .to_image()
    }
}

/// First and last index of a true value.
fn valid_bounds(line: &[bool]) -> Option<(usize, usize)> {
    let first = line.iter().position(|&v| v)?;
    let last = line.iter().rposition(|&v| v)?;
    Some((first, last))
}

/// Remap then crop, everything a frame needs to be undistorted.
#[derive(Debug, Clone)]
pub struct Undistorter {
    remapper: Remapper,
    region: ValidRegion,
}

impl Undistorter {
    /// Precompute the remap and the valid region of a map.
    /// The region is computed on the mask eroded by `mask_erosion` pixels,
    /// which cannot exceed the smallest side of the map.
    pub fn new(map: &DistortionMap, interpolation: Interpolation, mask_erosion: usize) -> Result<Self> {
        if mask_erosion > map.width().min(map.height()) {
            return Err(Error::Configuration(format!(
                "mask erosion of {} pixels on a {}x{} map",
                mask_erosion,
                map.width(),
                map.height()
            )));
        }
        let mask = map.eroded_mask(mask_erosion);
        let region = ValidRegion::from_mask(&mask, map.width(), map.height()).map_err(|reason| {
            Error::MalformedMap {
                path: map.origin().to_path_buf(),
                reason,
            }
        })?;
        log::debug!("valid region of {}: {:?}", map.origin().display(), region);
        Ok(Self {
            remapper: Remapper::new(map, interpolation),
            region,
        })
    }

    /// Valid region used for cropping.
    pub fn region(&self) -> ValidRegion {
        self.region
    }

    /// Undistort a raw image and crop it to the valid region.
    pub fn apply(&self, raw: &RgbImage) -> Result<RgbImage> {
        Ok(self.region.crop(&self.remapper.apply(raw)?))
    }
}

// TESTS #############################################################
