// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dense per-pixel remapping tables, as supplied by camera vendors.
//!
//! A map file associates every pixel of the undistorted (destination) image
//! with a sampling coordinate in the raw (source) image.
//! Two line layouts are understood:
//!
//! * `x y`: source column and row, one line per destination pixel,
//!   in raster order (row-major, top-to-bottom, left-to-right).
//! * `row col v u`: destination row and column followed by the source
//!   row `v` and column `u`, which is the layout of the NCLT `U2D_*.txt` files.
//!   Those files may also start with a `(width, height)` header line.
//!
//! Numbers are separated by spaces, tabs or commas.
//! Empty lines and lines starting with `#` are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use crate::misc::helper;
use crate::misc::type_aliases::{Float, Point2};
use crate::{Error, Result};

/// Immutable lookup structure built once from a map file.
///
/// `mapping` and `mask` are flat row-major arrays of `width * height`
/// elements, indexed by `row * width + col`.
#[derive(Debug, Clone)]
pub struct DistortionMap {
    width: usize,
    height: usize,
    source_width: usize,
    source_height: usize,
    mapping: Vec<Point2>,
    mask: Vec<bool>,
    origin: PathBuf,
}

impl DistortionMap {
    /// Load a map file for a camera of resolution `width x height`.
    /// Raw images are assumed to have the same resolution.
    pub fn from_file<P: AsRef<Path>>(file_path: P, width: usize, height: usize) -> Result<Self> {
        Self::from_file_with_source(file_path, (width, height), (width, height))
    }

    /// Load a map file whose raw images have a different resolution
    /// than the undistorted images.
    pub fn from_file_with_source<P: AsRef<Path>>(
        file_path: P,
        (width, height): (usize, usize),
        (source_width, source_height): (usize, usize),
    ) -> Result<Self> {
        let file_path = file_path.as_ref();
        let content = fs::read_to_string(file_path).map_err(|e| {
            Error::Configuration(format!(
                "cannot read distortion map {}: {}",
                file_path.display(),
                e
            ))
        })?;
        let mapping = parse::mapping(&content, width, height).map_err(|reason| {
            Error::MalformedMap {
                path: file_path.to_path_buf(),
                reason,
            }
        })?;
        let mut map = Self::from_mapping(width, height, source_width, source_height, mapping)?;
        map.origin = file_path.to_path_buf();
        Ok(map)
    }

    /// Parse the content of a map file, raw images having the destination resolution.
    pub fn parse(content: &str, width: usize, height: usize) -> Result<Self> {
        let mapping = parse::mapping(content, width, height).map_err(|reason| {
            Error::MalformedMap {
                path: PathBuf::from(IN_MEMORY),
                reason,
            }
        })?;
        Self::from_mapping(width, height, width, height, mapping)
    }

    /// Build a map from an already computed row-major mapping.
    /// The validity mask is derived from the source resolution.
    pub fn from_mapping(
        width: usize,
        height: usize,
        source_width: usize,
        source_height: usize,
        mapping: Vec<Point2>,
    ) -> Result<Self> {
        if width == 0 || height == 0 || source_width == 0 || source_height == 0 {
            return Err(Error::Configuration(format!(
                "invalid distortion map resolution {}x{} (source {}x{})",
                width, height, source_width, source_height
            )));
        }
        // Raw pixel offsets are stored on 32 bits.
        let nb_source = source_width.checked_mul(source_height).unwrap_or(usize::MAX);
        if nb_source > u32::MAX as usize {
            return Err(Error::Configuration(format!(
                "raw images of {}x{} pixels are too large",
                source_width, source_height
            )));
        }
        if mapping.len() != width * height {
            return Err(Error::MalformedMap {
                path: PathBuf::from(IN_MEMORY),
                reason: format!(
                    "{} entries for a {}x{} image",
                    mapping.len(),
                    width,
                    height
                ),
            });
        }
        let sw = source_width as Float;
        let sh = source_height as Float;
        // NaN coordinates fail every comparison and end up invalid.
        let mask = mapping
            .iter()
            .map(|p| p.x >= 0.0 && p.x < sw && p.y >= 0.0 && p.y < sh)
            .collect();
        Ok(Self {
            width,
            height,
            source_width,
            source_height,
            mapping,
            mask,
            origin: PathBuf::from(IN_MEMORY),
        })
    }

    /// Map where every destination pixel samples the same source pixel.
    pub fn identity(width: usize, height: usize) -> Self {
        let mapping = (0..width * height)
            .map(|index| {
                let (row, col) = helper::div_rem(index, width);
                Point2::new(col as Float, row as Float)
            })
            .collect();
        // Cannot fail: the mapping has the right size and every point is in bounds.
        Self {
            width,
            height,
            source_width: width,
            source_height: height,
            mask: vec![true; width * height],
            mapping,
            origin: PathBuf::from(IN_MEMORY),
        }
    }

    /// Width of the undistorted image.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the undistorted image.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Resolution `(width, height)` of the raw images this map samples.
    pub fn source_size(&self) -> (usize, usize) {
        (self.source_width, self.source_height)
    }

    /// Row-major source coordinates.
    pub fn mapping(&self) -> &[Point2] {
        &self.mapping
    }

    /// Row-major validity mask.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// File the map was loaded from, or a placeholder for in-memory maps.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Validity mask eroded by a square kernel of side `kernel`.
    ///
    /// A pixel stays valid only if the whole kernel window anchored on it
    /// is valid. Pixels outside of the image do not invalidate a window.
    /// A kernel of size 0 or 1 returns the mask unchanged.
    pub fn eroded_mask(&self, kernel: usize) -> Vec<bool> {
        if kernel <= 1 {
            return self.mask.clone();
        }
        let (w, h) = (self.width, self.height);
        let mut horizontal = vec![false; w * h];
        for (src, dst) in self.mask.chunks_exact(w).zip(horizontal.chunks_exact_mut(w)) {
            dst.copy_from_slice(&erode_line(src, kernel));
        }
        let mut eroded = vec![false; w * h];
        let mut column = vec![false; h];
        for col in 0..w {
            for row in 0..h {
                column[row] = horizontal[row * w + col];
            }
            for (row, valid) in erode_line(&column, kernel).into_iter().enumerate() {
                eroded[row * w + col] = valid;
            }
        }
        eroded
    }
}

const IN_MEMORY: &str = "<memory>";

/// 1D erosion with a window `[i - kernel / 2, i - kernel / 2 + kernel)`,
/// which matches the default anchor of a centered kernel.
fn erode_line(line: &[bool], kernel: usize) -> Vec<bool> {
    let n = line.len();
    // invalid_before[i] = number of invalid values in line[..i].
    let mut invalid_before = Vec::with_capacity(n + 1);
    invalid_before.push(0_usize);
    for &valid in line {
        let last = invalid_before[invalid_before.len() - 1];
        invalid_before.push(last + usize::from(!valid));
    }
    let anchor = kernel / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(anchor);
            let end = i.saturating_add(kernel - anchor).min(n);
            invalid_before[end] == invalid_before[start]
        })
        .collect()
}

/// Parse the text content of a map file.
mod parse {
    use super::*;
    use nom::{
        branch::alt,
        character::complete::{char, space0, space1, u32 as integer},
        combinator::{all_consuming, map},
        multi::separated_list1,
        number::complete::float,
        sequence::{delimited, separated_pair},
        IResult,
    };

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    enum Layout {
        Raster,
        Indexed,
    }

    /// Parse all the entries of a map file into a row-major mapping.
    pub fn mapping(content: &str, width: usize, height: usize) -> std::result::Result<Vec<Point2>, String> {
        let size = width * height;
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(nb, line)| (nb + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .peekable();

        // Optional "(width, height)" header line.
        if let Some((nb, line)) = lines.peek().cloned() {
            if let Ok((_, (w, h))) = all_consuming(header)(line) {
                if (w as usize, h as usize) != (width, height) {
                    return Err(format!(
                        "line {}: header announces {}x{} but {}x{} was configured",
                        nb, w, h, width, height
                    ));
                }
                lines.next();
            }
        }

        let mut layout = None;
        let mut mapping = vec![Point2::new(Float::NAN, Float::NAN); size];
        let mut filled = vec![false; size];
        let mut nb_entries = 0;
        for (nb, line) in lines {
            let values = match all_consuming(numbers)(line) {
                Ok((_, values)) => values,
                Err(_) => return Err(format!("line {}: cannot parse numbers", nb)),
            };
            let line_layout = match values.len() {
                2 => Layout::Raster,
                4 => Layout::Indexed,
                n => return Err(format!("line {}: expected 2 or 4 numbers, got {}", nb, n)),
            };
            if *layout.get_or_insert(line_layout) != line_layout {
                return Err(format!("line {}: mixed entry layouts", nb));
            }
            if nb_entries >= size {
                return Err(format!(
                    "more than {} entries for a {}x{} image",
                    size, width, height
                ));
            }
            let (index, point) = match line_layout {
                Layout::Raster => (nb_entries, Point2::new(values[0], values[1])),
                Layout::Indexed => {
                    let (row, col) = (values[0], values[1]);
                    if row.fract() != 0.0 || col.fract() != 0.0 || row < 0.0 || col < 0.0 {
                        return Err(format!("line {}: invalid pixel index", nb));
                    }
                    let (row, col) = (row as usize, col as usize);
                    if row >= height || col >= width {
                        return Err(format!(
                            "line {}: pixel ({}, {}) outside of {}x{}",
                            nb, row, col, width, height
                        ));
                    }
                    (row * width + col, Point2::new(values[3], values[2]))
                }
            };
            if filled[index] {
                let (row, col) = helper::div_rem(index, width);
                return Err(format!("line {}: pixel ({}, {}) given twice", nb, row, col));
            }
            filled[index] = true;
            mapping[index] = point;
            nb_entries += 1;
        }

        if nb_entries != size {
            return Err(format!(
                "{} entries for a {}x{} image, expected {}",
                nb_entries, width, height, size
            ));
        }
        Ok(mapping)
    }

    // nom parsers #############################################################

    // Separator between two numbers: a comma surrounded by optional spaces, or spaces.
    fn separator(input: &str) -> IResult<&str, ()> {
        alt((
            map(delimited(space0, char(','), space0), |_| ()),
            map(space1, |_| ()),
        ))(input)
    }

    // A line of numbers.
    fn numbers(input: &str) -> IResult<&str, Vec<Float>> {
        separated_list1(separator, float)(input)
    }

    // Header of the form "(1616, 1232)".
    fn header(input: &str) -> IResult<&str, (u32, u32)> {
        delimited(
            char('('),
            separated_pair(
                delimited(space0, integer, space0),
                char(','),
                delimited(space0, integer, space0),
            ),
            char(')'),
        )(input)
    }
}

// TESTS #############################################################
