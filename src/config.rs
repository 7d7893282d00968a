// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Experiment configuration, read from a YAML file.
//!
//! ```yaml
//! data:
//!   seq: 2012-01-08
//!   camera: 1
//!   undistort: false
//! model:
//!   name: thumbnail
//!   side: 16
//! weights: thumbnail.bin
//! ```
//!
//! Keys of `model` other than `name` are given to the model backend.
//! Other unknown keys are ignored with a warning, so that experiment files
//! shared with training keep loading.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::export::MissingFramePolicy;
use crate::core::undistort::Interpolation;
use crate::dataset::nclt;
use crate::{Error, Result};

/// Full experiment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Which frames to export and how to prepare them.
    pub data: DataConfig,
    /// Descriptor model.
    pub model: ModelConfig,
    /// Weights file, relative to `<data path>/weights`.
    #[serde(default)]
    pub weights: Option<PathBuf>,
    /// Keys not used by the export.
    #[serde(flatten)]
    pub ignored: BTreeMap<String, serde_yaml::Value>,
}

/// Dataset part of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Sequence name, such as `2012-01-08`.
    pub seq: String,
    /// Camera index.
    pub camera: u32,
    /// Width of the raw images.
    #[serde(default = "default_width")]
    pub width: usize,
    /// Height of the raw images.
    #[serde(default = "default_height")]
    pub height: usize,
    /// Extension of the raw image files.
    #[serde(default = "default_extension")]
    pub image_extension: String,
    /// Undistort and crop frames before extracting descriptors.
    #[serde(default)]
    pub undistort: bool,
    /// Side of the erosion kernel applied to the mask before computing the valid region.
    #[serde(default)]
    pub mask_erosion: usize,
    /// Sampling used when undistorting.
    #[serde(default)]
    pub interpolation: Interpolation,
    /// What to do when a frame image is missing.
    #[serde(default)]
    pub missing_frames: MissingFramePolicy,
    /// Keys not used by the export.
    #[serde(flatten)]
    pub ignored: BTreeMap<String, serde_yaml::Value>,
}

/// Model part of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Name of the model backend.
    pub name: String,
    /// Backend specific parameters.
    #[serde(flatten)]
    pub params: serde_yaml::Mapping,
}

fn default_width() -> usize {
    nclt::LB3_WIDTH
}

fn default_height() -> usize {
    nclt::LB3_HEIGHT
}

fn default_extension() -> String {
    nclt::LB3_EXTENSION.to_string()
}

/// Every path an export needs, derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    /// Directory of the raw images.
    pub image_dir: PathBuf,
    /// Pose file listing the timestamps.
    pub pose_file: PathBuf,
    /// Distortion map of the camera.
    pub distortion_map: PathBuf,
    /// Directory receiving the descriptors.
    pub output_dir: PathBuf,
    /// Weights of the model, if any.
    pub weights: Option<PathBuf>,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file_path = file_path.as_ref();
        let content = fs::read_to_string(file_path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", file_path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| Error::Configuration(format!("{}: {}", file_path.display(), e)))
    }

    /// Parse and validate a YAML configuration.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        let config: Config = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        for key in config.ignored_keys() {
            log::warn!("ignoring configuration key {}", key);
        }
        Ok(config)
    }

    /// Dotted names of the keys not used by the export.
    pub fn ignored_keys(&self) -> Vec<String> {
        let top = self.ignored.keys().cloned();
        let data = self.data.ignored.keys().map(|k| format!("data.{}", k));
        top.chain(data).collect()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.data.seq.is_empty() || self.data.seq.contains(['/', '\\']) {
            return Err(format!("invalid sequence name \"{}\"", self.data.seq));
        }
        if self.data.width == 0 || self.data.height == 0 {
            return Err(format!(
                "invalid resolution {}x{}",
                self.data.width, self.data.height
            ));
        }
        if self.data.mask_erosion > self.data.width.min(self.data.height) {
            return Err(format!(
                "mask erosion of {} pixels on {}x{} images",
                self.data.mask_erosion, self.data.width, self.data.height
            ));
        }
        if self.data.image_extension.trim_start_matches('.').is_empty() {
            return Err("empty image extension".to_string());
        }
        if self.model.name.is_empty() {
            return Err("missing model name".to_string());
        }
        Ok(())
    }

    /// Resolve the dataset, weights and output paths.
    ///
    /// * images: `<data>/datasets/nclt/<seq>/lb3/Cam<camera>/`
    /// * poses: `<data>/datasets/nclt/pose_<seq>.csv`
    /// * map: `<data>/datasets/nclt/undistort_maps/U2D_Cam<camera>_<W>X<H>.txt`
    /// * weights: `<data>/weights/<weights>`
    /// * output: `<exper>/outputs/<export_name>/<seq>/`
    pub fn paths<P, Q>(&self, data_path: P, exper_path: Q, export_name: &str) -> Result<ExportPaths>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        if export_name.is_empty() || export_name.contains(['/', '\\']) || export_name == ".." {
            return Err(Error::Configuration(format!(
                "invalid export name \"{}\"",
                export_name
            )));
        }
        let root = data_path.as_ref().join("datasets").join("nclt");
        let data = &self.data;
        Ok(ExportPaths {
            image_dir: nclt::image_dir(&root, &data.seq, data.camera),
            pose_file: nclt::pose_file_path(&root, &data.seq),
            distortion_map: nclt::distortion_map_path(&root, data.camera, data.width, data.height),
            output_dir: exper_path
                .as_ref()
                .join("outputs")
                .join(export_name)
                .join(&data.seq),
            weights: self
                .weights
                .as_ref()
                .map(|w| data_path.as_ref().join("weights").join(w)),
        })
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    const MINIMAL: &str = "data:\n  seq: 2012-01-08\n  camera: 1\nmodel:\n  name: thumbnail\n";

    #[test]
    fn defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.data.seq, "2012-01-08");
        assert_eq!((config.data.width, config.data.height), (1616, 1232));
        assert_eq!(config.data.image_extension, "tiff");
        assert!(!config.data.undistort);
        assert_eq!(config.data.mask_erosion, 0);
        assert_eq!(config.data.interpolation, Interpolation::Bilinear);
        assert_eq!(config.data.missing_frames, MissingFramePolicy::Abort);
        assert!(config.model.params.is_empty());
        assert_eq!(config.weights, None);
    }

    #[test]
    fn full_configuration() {
        let yaml = "\
data:
  seq: 2013-04-05
  camera: 4
  width: 800
  height: 600
  image_extension: png
  undistort: true
  mask_erosion: 30
  interpolation: nearest
  missing_frames: skip
model:
  name: thumbnail
  side: 8
weights: thumbnail/side8.bin
";
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.data.undistort);
        assert_eq!(config.data.mask_erosion, 30);
        assert_eq!(config.data.interpolation, Interpolation::Nearest);
        assert_eq!(config.data.missing_frames, MissingFramePolicy::Skip);
        assert_eq!(config.model.params.len(), 1);
        assert_eq!(config.weights, Some(PathBuf::from("thumbnail/side8.bin")));
    }

    #[test]
    fn invalid_configurations() {
        assert!(Config::from_yaml("data:\n  seq: a\nmodel:\n  name: thumbnail\n").is_err());
        assert!(Config::from_yaml(&MINIMAL.replace("2012-01-08", "../etc")).is_err());
        assert!(Config::from_yaml(&MINIMAL.replace("camera: 1", "camera: 1\n  width: 0")).is_err());
        assert!(Config::from_yaml(&MINIMAL.replace("camera: 1", "camera: 1\n  interpolation: cubic")).is_err());
    }

    #[test]
    fn mask_erosion_is_bounded() {
        let with_erosion = |erosion: &str| {
            Config::from_yaml(&MINIMAL.replace("camera: 1", &format!("camera: 1\n  mask_erosion: {}", erosion)))
        };
        assert!(with_erosion("1232").is_ok());
        assert!(with_erosion("1233").is_err());
        assert!(with_erosion("18446744073709551615").is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let yaml = format!("{}other: 1\n", MINIMAL.replace("camera: 1", "camera: 1\n  name: nclt"));
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.data.camera, 1);
        assert_eq!(config.ignored_keys(), vec!["other".to_string(), "data.name".to_string()]);
        assert!(Config::from_yaml(MINIMAL).unwrap().ignored_keys().is_empty());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/config.yaml"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn export_paths() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.weights = Some(PathBuf::from("net.onnx"));
        let paths = config.paths("/data", "/exper", "run1").unwrap();
        assert_eq!(
            paths,
            ExportPaths {
                image_dir: PathBuf::from("/data/datasets/nclt/2012-01-08/lb3/Cam1"),
                pose_file: PathBuf::from("/data/datasets/nclt/pose_2012-01-08.csv"),
                distortion_map: PathBuf::from(
                    "/data/datasets/nclt/undistort_maps/U2D_Cam1_1616X1232.txt"
                ),
                output_dir: PathBuf::from("/exper/outputs/run1/2012-01-08"),
                weights: Some(PathBuf::from("/data/weights/net.onnx")),
            }
        );
        assert!(config.paths("/data", "/exper", "a/b").is_err());
    }
}
