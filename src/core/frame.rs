// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Load raw frames from disk and prepare them for descriptor extraction.

use image::{imageops, ImageBuffer, Pixel, RgbImage};
use std::path::{Path, PathBuf};

use crate::core::undistort::Undistorter;
use crate::{Error, Result};

/// Number of counter-clockwise quarter turns normalizing the sensor mounting.
pub const CANONICAL_QUARTER_TURNS: u32 = 3;

/// Raw images of one camera of one sequence, named by frame identifier.
pub struct FrameSource {
    dir: PathBuf,
    extension: String,
    undistorter: Option<Undistorter>,
}

impl FrameSource {
    /// Frames are read from `<dir>/<id>.<extension>`.
    pub fn new<P: AsRef<Path>>(dir: P, extension: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
            undistorter: None,
        }
    }

    /// Enable undistortion of the frames.
    pub fn with_undistortion(mut self, undistorter: Undistorter) -> Self {
        self.undistorter = Some(undistorter);
        self
    }

    /// Whether frames can be undistorted.
    pub fn can_undistort(&self) -> bool {
        self.undistorter.is_some()
    }

    /// Path of the raw image of a frame.
    pub fn frame_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.extension))
    }

    /// Read the raw image of a frame as 3 channels RGB.
    pub fn load_raw(&self, id: &str) -> Result<RgbImage> {
        let path = self.frame_path(id);
        match image::open(&path) {
            Ok(img) => Ok(img.to_rgb8()),
            Err(e) => {
                log::debug!("cannot read {}: {}", path.display(), e);
                Err(Error::FrameNotFound {
                    id: id.to_string(),
                    path,
                })
            }
        }
    }

    /// Load a frame, optionally undistort and crop it,
    /// then rotate it into the canonical orientation.
    pub fn load_frame(&self, id: &str, apply_undistort: bool) -> Result<RgbImage> {
        let raw = self.load_raw(id)?;
        let img = if apply_undistort {
            let undistorter = self.undistorter.as_ref().ok_or_else(|| {
                Error::Configuration(
                    "undistortion requested but no distortion map was loaded".to_string(),
                )
            })?;
            undistorter.apply(&raw)?
        } else {
            raw
        };
        Ok(rotate_ccw(&img, CANONICAL_QUARTER_TURNS))
    }
}

/// Rotate an image by `quarter_turns` times 90 degrees counter-clockwise.
pub fn rotate_ccw<P>(img: &ImageBuffer<P, Vec<P::Subpixel>>, quarter_turns: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    // imageops turns are clockwise.
    match quarter_turns % 4 {
        1 => imageops::rotate270(img),
        2 => imageops::rotate180(img),
        3 => imageops::rotate90(img),
        _ => img.clone(),
    }
}

// TESTS #############################################################
