// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Descriptor extraction models.
//!
//! The export pipeline only needs two operations from a model:
//! loading its weights once, and turning a prepared image into a
//! fixed-shape numeric descriptor. Any backend implementing
//! [`DescriptorModel`] can be plugged in.

use image::RgbImage;
use std::path::Path;

use crate::config::ModelConfig;
use crate::{Error, Result};

pub mod thumbnail;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use thumbnail::ThumbnailModel;
#[cfg(feature = "backend-tract")]
pub use tract::TractModel;

/// Numeric array produced by a model, stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Descriptor {
    /// Create a descriptor, the number of values must match the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> std::result::Result<Self, String> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    /// One dimensional descriptor.
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Dimensions of the array.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Values in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a descriptor without values.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Capability interface of a descriptor extraction model.
pub trait DescriptorModel {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Initialize the model from a weights file. Called once before any prediction.
    fn load(&mut self, weights_path: &Path) -> Result<()>;

    /// Whether `load` must be called before `predict` can succeed.
    fn requires_weights(&self) -> bool {
        false
    }

    /// Compute the descriptor of a prepared 3 channels image of any size.
    fn predict(&mut self, image: &RgbImage) -> Result<Descriptor>;
}

/// Instantiate the model named in the configuration.
pub fn from_config(config: &ModelConfig) -> Result<Box<dyn DescriptorModel>> {
    match config.name.as_str() {
        thumbnail::NAME => Ok(Box::new(ThumbnailModel::from_params(&config.params)?)),
        #[cfg(feature = "backend-tract")]
        tract::NAME => Ok(Box::new(TractModel::from_params(&config.params)?)),
        other => Err(Error::Configuration(format!(
            "unknown model \"{}\" (available: {})",
            other,
            available().join(", ")
        ))),
    }
}

/// Load the configured weights into a model.
///
/// A model that cannot predict without weights is a configuration error
/// when no weights are given.
pub fn load_weights<M>(model: &mut M, weights_path: Option<&Path>) -> Result<()>
where
    M: DescriptorModel + ?Sized,
{
    match weights_path {
        Some(path) => {
            model.load(path)?;
            log::info!("loaded weights {}", path.display());
            Ok(())
        }
        None if model.requires_weights() => Err(Error::Configuration(format!(
            "model {} needs weights but none are configured",
            model.name()
        ))),
        None => Ok(()),
    }
}

/// Names of the models compiled in.
pub fn available() -> Vec<&'static str> {
    let mut names = vec![thumbnail::NAME];
    if cfg!(feature = "backend-tract") {
        names.push("tract");
    }
    names
}

/// Deserialize backend specific parameters from the model configuration.
fn params<T: serde::de::DeserializeOwned>(model: &str, params: &serde_yaml::Mapping) -> Result<T> {
    serde_yaml::from_value(serde_yaml::Value::Mapping(params.clone())).map_err(|e| {
        Error::Configuration(format!("invalid parameters for model {}: {}", model, e))
    })
}

// TESTS #############################################################
