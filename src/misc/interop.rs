// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image, matrix and tensor types.

use image::{GrayImage, RgbImage};
use nalgebra::{DMatrix, Scalar};
use serde::Deserialize;

/// Order of the color planes expected by a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Red, green, blue.
    Rgb,
    /// Blue, green, red, as images decoded by OpenCV.
    #[default]
    Bgr,
}

/// Convert a `GrayImage` into an `u8` matrix.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Values of a matrix in row-major order.
///
/// Matrices are column major, so this performs a transposition.
pub fn row_major<T: Scalar>(mat: &DMatrix<T>) -> Vec<T> {
    mat.transpose().as_slice().to_vec()
}

/// Planar `3 x height x width` buffer of values in `[0, 1]`.
pub fn planar_from_image(img: &RgbImage, order: ChannelOrder) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut planes = vec![0.0; 3 * plane];
    for (index, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            let plane_index = match order {
                ChannelOrder::Rgb => c,
                ChannelOrder::Bgr => 2 - c,
            };
            planes[plane_index * plane + index] = pixel[c] as f32 / 255.0;
        }
    }
    planes
}

// TESTS #############################################################
