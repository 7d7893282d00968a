// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tiny image descriptor.
//!
//! The image is converted to gray, resized to a small square,
//! centered and normalized. It needs no weights, which makes it
//! handy for smoke runs of the pipeline and as a weak baseline
//! for place recognition.

use image::{imageops, RgbImage};
use serde::Deserialize;
use std::path::Path;

use super::{Descriptor, DescriptorModel};
use crate::misc::interop;
use crate::{Error, Result};

/// Name of the model in configuration files.
pub const NAME: &str = "thumbnail";

/// Parameters of the thumbnail model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Side of the square thumbnail, the descriptor has `side * side` values.
    pub side: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self { side: 16 }
    }
}

/// Zero-mean, unit-norm gray thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbnailModel {
    side: u32,
}

impl ThumbnailModel {
    /// Thumbnail of `side x side` pixels.
    pub fn new(side: u32) -> Self {
        Self { side }
    }

    /// Build from the backend specific part of a model configuration.
    pub fn from_params(params: &serde_yaml::Mapping) -> Result<Self> {
        let params: Params = super::params(NAME, params)?;
        if params.side == 0 {
            return Err(Error::Configuration(
                "thumbnail side must be positive".to_string(),
            ));
        }
        Ok(Self::new(params.side))
    }
}

impl DescriptorModel for ThumbnailModel {
    fn name(&self) -> &str {
        NAME
    }

    fn load(&mut self, weights_path: &Path) -> Result<()> {
        // Nothing to load, but a configured path that does not exist is still a mistake.
        if weights_path.exists() {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "weights file {} does not exist",
                weights_path.display()
            )))
        }
    }

    fn predict(&mut self, image: &RgbImage) -> Result<Descriptor> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::model(NAME, "empty image"));
        }
        let gray = imageops::grayscale(image);
        let small = imageops::resize(&gray, self.side, self.side, imageops::FilterType::Triangle);
        let mut mat = interop::matrix_from_image(small).map(|v| v as f32);
        let mean = mat.mean();
        mat.add_scalar_mut(-mean);
        let norm = mat.norm();
        if norm > f32::EPSILON {
            mat /= norm;
        }
        Ok(Descriptor::from_vec(interop::row_major(&mat)))
    }
}

// TESTS #############################################################
