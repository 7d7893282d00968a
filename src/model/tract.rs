// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! ONNX descriptor networks run with tract.
//!
//! The network takes a `1 x 3 x H x W` tensor of values in `[0, 1]`
//! and its output tensor is stored as the descriptor.
//! Input sizes are free, so the network is optimized for the size
//! of the first frame and optimized again only if the size changes.

use image::RgbImage;
use serde::Deserialize;
use std::path::Path;
use tract_onnx::prelude::*;

use super::{Descriptor, DescriptorModel};
use crate::misc::interop::{self, ChannelOrder};
use crate::{Error, Result};

/// Name of the model in configuration files.
pub const NAME: &str = "tract";

/// Parameters of the tract model.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Color plane order expected by the network.
    pub channel_order: ChannelOrder,
    /// Index of the network output holding the descriptor.
    pub output: usize,
}

type Plan = TypedRunnableModel<TypedModel>;

/// ONNX network, loaded by `load`.
pub struct TractModel {
    params: Params,
    network: Option<InferenceModel>,
    plan: Option<((u32, u32), Plan)>,
}

impl TractModel {
    /// Model not yet loaded.
    pub fn new(params: Params) -> Self {
        Self {
            params,
            network: None,
            plan: None,
        }
    }

    /// Build from the backend specific part of a model configuration.
    pub fn from_params(params: &serde_yaml::Mapping) -> Result<Self> {
        Ok(Self::new(super::params(NAME, params)?))
    }

    fn plan_for(&mut self, width: u32, height: u32) -> Result<&Plan> {
        let up_to_date = matches!(&self.plan, Some((size, _)) if *size == (width, height));
        if !up_to_date {
            let network = self
                .network
                .clone()
                .ok_or_else(|| Error::model(NAME, "weights were not loaded"))?;
            log::debug!("optimizing network for {}x{} images", width, height);
            let plan = network
                .with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, 3, height as usize, width as usize),
                    ),
                )
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| Error::model(NAME, format!("cannot prepare network: {}", e)))?;
            self.plan = Some(((width, height), plan));
        }
        match &self.plan {
            Some((_, plan)) => Ok(plan),
            None => Err(Error::model(NAME, "network is not ready")),
        }
    }
}

impl DescriptorModel for TractModel {
    fn name(&self) -> &str {
        NAME
    }

    fn load(&mut self, weights_path: &Path) -> Result<()> {
        let network = tract_onnx::onnx().model_for_path(weights_path).map_err(|e| {
            Error::Configuration(format!(
                "cannot load ONNX network {}: {}",
                weights_path.display(),
                e
            ))
        })?;
        self.network = Some(network);
        self.plan = None;
        Ok(())
    }

    fn requires_weights(&self) -> bool {
        true
    }

    fn predict(&mut self, image: &RgbImage) -> Result<Descriptor> {
        let (width, height) = image.dimensions();
        let order = self.params.channel_order;
        let output_index = self.params.output;
        let input = tract_ndarray::Array4::from_shape_vec(
            (1, 3, height as usize, width as usize),
            interop::planar_from_image(image, order),
        )
        .map_err(|e| Error::model(NAME, e))?;
        let outputs = self
            .plan_for(width, height)?
            .run(tvec!(input.into_tensor().into()))
            .map_err(|e| Error::model(NAME, format!("inference failed: {}", e)))?;
        let output = outputs
            .get(output_index)
            .ok_or_else(|| Error::model(NAME, format!("network has no output {}", output_index)))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| Error::model(NAME, format!("output is not f32: {}", e)))?;
        Descriptor::new(view.shape().to_vec(), view.iter().cloned().collect())
            .map_err(|e| Error::model(NAME, e))
    }
}
