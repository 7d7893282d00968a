// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Descriptor export in Rust (dxrs).
//!
//! Turn a sequence of raw, lens-distorted camera images into one
//! compressed descriptor file per timestamp.
//! The interesting part lives in [`core`]: loading a dense remap table,
//! applying it to raw frames, cropping to the valid region
//! and rotating frames into their canonical orientation.
//! The descriptor model itself is an external collaborator behind the
//! [`model::DescriptorModel`] trait.

pub mod config;
pub mod core;
pub mod dataset;
pub mod error;
pub mod misc;
pub mod model;

pub use crate::error::{Error, Result};
