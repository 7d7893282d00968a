// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Export one descriptor file per frame of a sequence.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::frame::FrameSource;
use crate::dataset::nclt::FrameRecord;
use crate::misc::npz;
use crate::model::DescriptorModel;
use crate::{Error, Result};

/// Name of the array inside every descriptor file.
pub const DESCRIPTOR_KEY: &str = "descriptor";

/// Extension of the descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "npz";

/// What to do when the raw image of a frame is missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingFramePolicy {
    /// Stop the export with a `FrameNotFound` error.
    #[default]
    Abort,
    /// Log a warning and continue with the next frame.
    Skip,
}

/// Outcome of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of descriptor files written.
    pub exported: usize,
    /// Timestamps of the frames skipped because their image was missing.
    pub skipped: Vec<u64>,
}

/// Configuration of an export run.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    apply_undistort: bool,
    missing_frames: MissingFramePolicy,
}

impl Exporter {
    /// Export to `output_dir`, frames only rotated, aborting on missing frames.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            apply_undistort: false,
            missing_frames: MissingFramePolicy::Abort,
        }
    }

    /// Undistort and crop frames before extracting descriptors.
    pub fn with_undistortion(mut self, apply_undistort: bool) -> Self {
        self.apply_undistort = apply_undistort;
        self
    }

    /// Choose what happens with missing frames.
    pub fn with_missing_frames(mut self, policy: MissingFramePolicy) -> Self {
        self.missing_frames = policy;
        self
    }

    /// Directory receiving the descriptor files.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the descriptor file of a frame.
    pub fn output_path(&self, timestamp: u64) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", timestamp, DESCRIPTOR_EXTENSION))
    }

    /// Compute and write the descriptor of every record, in order.
    ///
    /// `progress` is called once per record, whatever its outcome.
    /// Existing descriptor files are overwritten.
    pub fn run<M, F>(
        &self,
        records: &[FrameRecord],
        source: &FrameSource,
        model: &mut M,
        mut progress: F,
    ) -> Result<ExportSummary>
    where
        M: DescriptorModel + ?Sized,
        F: FnMut(&FrameRecord),
    {
        if self.apply_undistort && !source.can_undistort() {
            return Err(Error::Configuration(
                "undistortion requested but the frame source has no distortion map".to_string(),
            ));
        }
        fs::create_dir_all(&self.output_dir)?;
        log::info!(
            "exporting {} frames to {} with model {} (undistort: {})",
            records.len(),
            self.output_dir.display(),
            model.name(),
            self.apply_undistort
        );

        let mut summary = ExportSummary::default();
        for record in records {
            let res = self.export_frame(record, source, model);
            progress(record);
            match res {
                Ok(()) => summary.exported += 1,
                Err(Error::FrameNotFound { id, path })
                    if self.missing_frames == MissingFramePolicy::Skip =>
                {
                    log::warn!("skipping frame {}: {} not found", id, path.display());
                    summary.skipped.push(record.timestamp);
                }
                Err(e) => return Err(e),
            }
        }
        log::info!(
            "exported {} descriptors, skipped {} frames",
            summary.exported,
            summary.skipped.len()
        );
        Ok(summary)
    }

    fn export_frame<M>(&self, record: &FrameRecord, source: &FrameSource, model: &mut M) -> Result<()>
    where
        M: DescriptorModel + ?Sized,
    {
        let img = source.load_frame(&record.id(), self.apply_undistort)?;
        let descriptor = model.predict(&img)?;
        let file_path = self.output_path(record.timestamp);
        log::debug!(
            "frame {}: {:?} image, descriptor {:?}",
            record.timestamp,
            img.dimensions(),
            descriptor.shape()
        );
        npz::write_array(&file_path, DESCRIPTOR_KEY, &descriptor)
    }
}

// TESTS #############################################################
