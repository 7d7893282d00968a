// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic NCLT-like dataset trees.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

pub const SEQ: &str = "2012-01-08";
pub const CAMERA: u32 = 1;
pub const WIDTH: u32 = 8;
pub const HEIGHT: u32 = 6;

/// Data and experiment roots of a test run.
pub struct Layout {
    pub data: PathBuf,
    pub exper: PathBuf,
    pub config: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        let layout = Self {
            data: root.join("data"),
            exper: root.join("exper"),
            config: root.join("config.yaml"),
        };
        fs::create_dir_all(layout.nclt()).expect("create dataset dir");
        fs::create_dir_all(&layout.exper).expect("create exper dir");
        layout
    }

    pub fn nclt(&self) -> PathBuf {
        self.data.join("datasets").join("nclt")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.nclt().join(SEQ).join("lb3").join(format!("Cam{}", CAMERA))
    }

    pub fn output_dir(&self, export_name: &str) -> PathBuf {
        self.exper.join("outputs").join(export_name).join(SEQ)
    }

    pub fn write_config(&self, extra_data: &str) {
        let yaml = format!(
            "data:\n  seq: {}\n  camera: {}\n  width: {}\n  height: {}\n  image_extension: png\n{}model:\n  name: thumbnail\n  side: 4\n",
            SEQ, CAMERA, WIDTH, HEIGHT, extra_data
        );
        fs::write(&self.config, yaml).expect("write config");
    }

    pub fn write_poses(&self, content: &str) {
        fs::write(self.nclt().join(format!("pose_{}.csv", SEQ)), content).expect("write poses");
    }

    pub fn write_frames(&self, timestamps: &[u64]) {
        fs::create_dir_all(self.image_dir()).expect("create image dir");
        for &t in timestamps {
            RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
                Rgb([(x * 30) as u8, (y * 40) as u8, (t % 256) as u8])
            })
            .save(self.image_dir().join(format!("{}.png", t)))
            .expect("write frame");
        }
    }

    /// Identity map in the indexed NCLT layout, with its header.
    pub fn write_identity_map(&self) {
        let dir = self.nclt().join("undistort_maps");
        fs::create_dir_all(&dir).expect("create map dir");
        let mut content = format!("({}, {})\n", WIDTH, HEIGHT);
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                content.push_str(&format!("{} {} {} {}\n", row, col, row, col));
            }
        }
        let name = format!("U2D_Cam{}_{}X{}.txt", CAMERA, WIDTH, HEIGHT);
        fs::write(dir.join(name), content).expect("write map");
    }
}

pub fn npz_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read output dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
