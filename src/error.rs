// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type shared by every stage of the export pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias with the crate `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways an export can fail.
///
/// Map and pose file errors happen before any descriptor is written,
/// so they never leave partial outputs behind.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid paths and parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The distortion map file is structurally invalid.
    #[error("Malformed distortion map {path}: {reason}")]
    MalformedMap { path: PathBuf, reason: String },

    /// The pose (timestamps) file is structurally invalid.
    #[error("Malformed pose file {path}: {reason}")]
    MalformedPoseFile { path: PathBuf, reason: String },

    /// The raw image of a frame is absent or unreadable.
    #[error("Frame {id} not found or unreadable at {path}")]
    FrameNotFound { id: String, path: PathBuf },

    /// The descriptor model failed on a given input.
    #[error("Model {model} failed: {reason}")]
    ModelInference { model: String, reason: String },

    /// A descriptor archive could not be written or read back.
    #[error("Serialization error for {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shortcut for a `ModelInference` error.
    pub fn model<M: Into<String>, R: ToString>(model: M, reason: R) -> Self {
        Error::ModelInference {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}
