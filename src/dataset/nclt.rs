// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to handle datasets laid out like the NCLT dataset.
//!
//! ```text
//! <root>/pose_<seq>.csv
//! <root>/<seq>/lb3/Cam<k>/<timestamp>.tiff
//! <root>/undistort_maps/U2D_Cam<k>_<W>X<H>.txt
//! ```

use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Width of the Ladybug3 camera images.
pub const LB3_WIDTH: usize = 1616;

/// Height of the Ladybug3 camera images.
pub const LB3_HEIGHT: usize = 1232;

/// Extension of the raw Ladybug3 images.
pub const LB3_EXTENSION: &str = "tiff";

/// Columns expected at the start of the pose file header.
pub const POSE_COLUMNS: [&str; 3] = ["time", "pose_x", "pose_y"];

/// Timestamp and ground pose of a captured frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameRecord {
    /// Timestamp of the frame, also the name of its image file.
    #[serde(rename = "time")]
    pub timestamp: u64,
    /// Ground position, first coordinate.
    #[serde(rename = "pose_x")]
    pub pos_x: f64,
    /// Ground position, second coordinate.
    #[serde(rename = "pose_y")]
    pub pos_y: f64,
}

impl FrameRecord {
    /// Frame identifier used to name image and descriptor files.
    pub fn id(&self) -> String {
        self.timestamp.to_string()
    }
}

/// Directory of the raw images of a camera for a sequence.
pub fn image_dir<P: AsRef<Path>>(root: P, seq: &str, camera: u32) -> PathBuf {
    root.as_ref()
        .join(seq)
        .join("lb3")
        .join(format!("Cam{}", camera))
}

/// Distortion map of a camera at a given resolution.
pub fn distortion_map_path<P: AsRef<Path>>(root: P, camera: u32, width: usize, height: usize) -> PathBuf {
    root.as_ref()
        .join("undistort_maps")
        .join(format!("U2D_Cam{}_{}X{}.txt", camera, width, height))
}

/// Pose file of a sequence.
pub fn pose_file_path<P: AsRef<Path>>(root: P, seq: &str) -> PathBuf {
    root.as_ref().join(format!("pose_{}.csv", seq))
}

/// Open a pose file and parse it into a vector of `FrameRecord`, in file order.
pub fn load_sequence<P: AsRef<Path>>(file_path: P) -> Result<Vec<FrameRecord>> {
    let file_path = file_path.as_ref();
    let file = File::open(file_path).map_err(|e| {
        Error::Configuration(format!(
            "cannot open pose file {}: {}",
            file_path.display(),
            e
        ))
    })?;
    parse_sequence(file).map_err(|reason| Error::MalformedPoseFile {
        path: file_path.to_path_buf(),
        reason,
    })
}

/// Parse the content of a pose file.
///
/// Records are returned in file order, which is expected to be sorted
/// by timestamp. Extra columns after the pose are ignored.
pub fn parse_sequence<R: Read>(reader: R) -> std::result::Result<Vec<FrameRecord>, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| format!("cannot read header: {}", e))?
        .clone();
    let matches = headers.len() >= POSE_COLUMNS.len()
        && headers.iter().zip(POSE_COLUMNS.iter()).all(|(h, c)| h == *c);
    if !matches {
        return Err(format!(
            "header {:?} does not start with {}",
            headers.iter().collect::<Vec<_>>(),
            POSE_COLUMNS.join(",")
        ));
    }
    csv_reader
        .deserialize()
        .enumerate()
        .map(|(index, record)| {
            // Line 1 is the header.
            record.map_err(|e| format!("line {}: {}", index + 2, e))
        })
        .collect()
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn two_records_in_order() {
        let content = "time,pose_x,pose_y\n1000,1.0,2.0\n1001,1.1,2.1\n";
        let records = parse_sequence(content.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![
                FrameRecord { timestamp: 1000, pos_x: 1.0, pos_y: 2.0 },
                FrameRecord { timestamp: 1001, pos_x: 1.1, pos_y: 2.1 },
            ]
        );
        assert_eq!(records[1].id(), "1001");
    }

    #[test]
    fn file_order_is_kept() {
        let content = "time,pose_x,pose_y\n1326030975726043,0,0\n1326030975526051,3.5,-2\n";
        let records = parse_sequence(content.as_bytes()).unwrap();
        assert_eq!(records[0].timestamp, 1326030975726043);
        assert_eq!(records[1].timestamp, 1326030975526051);
    }

    #[test]
    fn spaces_and_extra_columns() {
        let content = "time, pose_x, pose_y, pose_z\n 5, 0.5, 1.5, 9\n";
        let records = parse_sequence(content.as_bytes()).unwrap();
        assert_eq!(records, vec![FrameRecord { timestamp: 5, pos_x: 0.5, pos_y: 1.5 }]);
    }

    #[test]
    fn header_only() {
        let records = parse_sequence("time,pose_x,pose_y\n".as_bytes()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn renamed_column() {
        let content = "time,x,pose_y\n1000,1.0,2.0\n";
        assert!(parse_sequence(content.as_bytes()).is_err());
        let content = "time,pose_x\n1000,1.0\n";
        assert!(parse_sequence(content.as_bytes()).is_err());
    }

    #[test]
    fn unparsable_values() {
        let content = "time,pose_x,pose_y\n1000,1.0,2.0\n10a1,1.1,2.1\n";
        let err = parse_sequence(content.as_bytes()).unwrap_err();
        assert!(err.starts_with("line 3"), "{}", err);
        let content = "time,pose_x,pose_y\n1000,1.0\n";
        assert!(parse_sequence(content.as_bytes()).is_err());
        let content = "time,pose_x,pose_y\n-4,1.0,2.0\n";
        assert!(parse_sequence(content.as_bytes()).is_err());
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("pose_2012-01-08.csv");
        assert!(matches!(load_sequence(&missing), Err(Error::Configuration(_))));
        std::fs::write(&missing, "t,x,y\n1,2,3\n").unwrap();
        assert!(matches!(
            load_sequence(&missing),
            Err(Error::MalformedPoseFile { .. })
        ));
    }

    #[test]
    fn dataset_layout() {
        let root = Path::new("/data/nclt");
        assert_eq!(
            image_dir(root, "2012-01-08", 1),
            PathBuf::from("/data/nclt/2012-01-08/lb3/Cam1")
        );
        assert_eq!(
            distortion_map_path(root, 1, LB3_WIDTH, LB3_HEIGHT),
            PathBuf::from("/data/nclt/undistort_maps/U2D_Cam1_1616X1232.txt")
        );
        assert_eq!(
            pose_file_path(root, "2012-01-08"),
            PathBuf::from("/data/nclt/pose_2012-01-08.csv")
        );
    }
}
