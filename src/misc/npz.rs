// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Read and write compressed `.npz` archives holding a single named array.
//!
//! An `.npz` file is a zip archive of `.npy` files.
//! Arrays are stored as little endian `f32` in C order, with a version 1.0
//! `.npy` header, so they load directly with `numpy.load(path)[name]`.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use itertools::Itertools;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::misc::helper;
use crate::model::Descriptor;
use crate::{Error, Result};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Header (magic, version, length and dictionary) size is padded to a multiple of this.
const ALIGNMENT: usize = 64;

/// Write `array` under `name` in a deflate compressed archive at `file_path`.
///
/// An existing file is replaced. The archive content only depends on
/// the array, so writing the same array twice gives identical files.
pub fn write_array<P: AsRef<Path>>(file_path: P, name: &str, array: &Descriptor) -> Result<()> {
    let file_path = file_path.as_ref();
    helper::write_atomic(file_path, |tmp_path| {
        let npy = encode_npy(array)?;
        let mut zip = ZipWriter::new(BufWriter::new(File::create(tmp_path)?));
        zip.start_file(format!("{}.npy", name), entry_options())
            .map_err(to_io)?;
        zip.write_all(&npy)?;
        zip.finish().map_err(to_io)?.flush()
    })
    .map_err(|e| Error::Serialization {
        path: file_path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read the array stored under `name` in the archive at `file_path`.
pub fn read_array<P: AsRef<Path>>(file_path: P, name: &str) -> Result<Descriptor> {
    let file_path = file_path.as_ref();
    let serialization_error = |reason: String| Error::Serialization {
        path: file_path.to_path_buf(),
        reason,
    };
    let file = File::open(file_path)?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| serialization_error(e.to_string()))?;
    let mut entry = archive
        .by_name(&format!("{}.npy", name))
        .map_err(|e| serialization_error(format!("array {}: {}", name, e)))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    decode_npy(&bytes).map_err(serialization_error)
}

/// Fixed modification time keeps archives reproducible.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

fn to_io(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Serialize an array in the `.npy` format.
fn encode_npy(array: &Descriptor) -> io::Result<Vec<u8>> {
    let shape = match array.shape() {
        [n] => format!("({},)", n),
        dims => format!("({})", dims.iter().join(", ")),
    };
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape
    );
    // magic + 2 bytes version + 2 bytes header length + header + '\n'
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut bytes = Vec::with_capacity(unpadded + padding + 4 * array.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.write_u16::<LittleEndian>(header.len() as u16)?;
    bytes.extend_from_slice(header.as_bytes());
    for &value in array.data() {
        bytes.write_f32::<LittleEndian>(value)?;
    }
    Ok(bytes)
}

/// Deserialize a little endian `f32` array in the `.npy` format.
fn decode_npy(bytes: &[u8]) -> std::result::Result<Descriptor, String> {
    if bytes.len() < 10 || &bytes[..MAGIC.len()] != MAGIC {
        return Err("not a npy array".to_string());
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (LittleEndian::read_u16(&bytes[8..10]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (LittleEndian::read_u32(&bytes[8..12]) as usize, 12),
        version => return Err(format!("unsupported npy version {}", version)),
    };
    let header_end = header_start + header_len;
    if bytes.len() < header_end {
        return Err("truncated npy header".to_string());
    }
    let header = std::str::from_utf8(&bytes[header_start..header_end])
        .map_err(|_| "npy header is not text".to_string())?;
    let (descr, fortran_order, shape) = match parse::header(header.trim_end()) {
        Ok((_, dict)) => dict,
        Err(_) => return Err(format!("invalid npy header {:?}", header.trim_end())),
    };
    if descr != "<f4" {
        return Err(format!("unsupported dtype {}, expected <f4", descr));
    }
    if fortran_order && shape.len() > 1 {
        return Err("fortran ordered arrays are not supported".to_string());
    }
    let count: usize = shape.iter().product();
    let data_bytes = &bytes[header_end..];
    if data_bytes.len() != 4 * count {
        return Err(format!(
            "{} data bytes for {} values",
            data_bytes.len(),
            count
        ));
    }
    let mut data = vec![0.0; count];
    LittleEndian::read_f32_into(data_bytes, &mut data);
    Descriptor::new(shape, data)
}

/// Parse the dictionary of a `.npy` header.
mod parse {
    use nom::{
        branch::alt,
        bytes::complete::{is_not, tag},
        character::complete::{char, digit1, multispace0},
        combinator::{all_consuming, map_res, opt, value},
        multi::separated_list0,
        sequence::{delimited, pair, preceded, terminated, tuple},
        IResult,
    };

    /// `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }`
    pub fn header(input: &str) -> IResult<&str, (&str, bool, Vec<usize>)> {
        all_consuming(delimited(
            pair(char('{'), multispace0),
            tuple((
                field("descr", quoted),
                field("fortran_order", boolean),
                field("shape", shape),
            )),
            pair(char('}'), multispace0),
        ))(input)
    }

    // A `'key': value` entry with an optional trailing comma.
    fn field<'a, O, F>(key: &'static str, parser: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
    where
        F: FnMut(&'a str) -> IResult<&'a str, O>,
    {
        terminated(
            preceded(
                tuple((
                    char('\''),
                    tag(key),
                    char('\''),
                    multispace0,
                    char(':'),
                    multispace0,
                )),
                parser,
            ),
            pair(multispace0, opt(pair(char(','), multispace0))),
        )
    }

    fn quoted(input: &str) -> IResult<&str, &str> {
        delimited(char('\''), is_not("'"), char('\''))(input)
    }

    fn boolean(input: &str) -> IResult<&str, bool> {
        alt((value(true, tag("True")), value(false, tag("False"))))(input)
    }

    // Python tuple of integers: `()`, `(5,)` or `(2, 3)`.
    fn shape(input: &str) -> IResult<&str, Vec<usize>> {
        delimited(
            pair(char('('), multispace0),
            terminated(
                separated_list0(
                    tuple((multispace0, char(','), multispace0)),
                    map_res(digit1, str::parse::<usize>),
                ),
                opt(pair(multispace0, char(','))),
            ),
            pair(multispace0, char(')')),
        )(input)
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use quickcheck_macros;

    #[test]
    fn header_is_aligned() {
        let bytes = encode_npy(&Descriptor::from_vec(vec![1.0, 2.0, 3.0])).unwrap();
        let header_len = LittleEndian::read_u16(&bytes[8..10]) as usize;
        assert_eq!((10 + header_len) % ALIGNMENT, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 10 + header_len + 12);
    }

    #[test]
    fn numpy_style_headers() {
        let (_, dict) = parse::header("{'descr': '<f4', 'fortran_order': False, 'shape': (4096,), }").unwrap();
        assert_eq!(dict, ("<f4", false, vec![4096]));
        let (_, dict) = parse::header("{'descr': '<f4', 'fortran_order': True, 'shape': (2, 3)}").unwrap();
        assert_eq!(dict, ("<f4", true, vec![2, 3]));
        let (_, dict) = parse::header("{'descr': '<f4', 'fortran_order': False, 'shape': ()}").unwrap();
        assert_eq!(dict, ("<f4", false, vec![]));
    }

    #[test]
    fn wrong_dtype_is_rejected() {
        let mut bytes = encode_npy(&Descriptor::from_vec(vec![1.0])).unwrap();
        let at = bytes.windows(3).position(|w| w == b"<f4").unwrap();
        bytes[at + 2] = b'8';
        assert!(decode_npy(&bytes).unwrap_err().contains("<f8"));
    }

    #[test]
    fn truncated_data_is_rejected() {
        let mut bytes = encode_npy(&Descriptor::from_vec(vec![1.0, 2.0])).unwrap();
        bytes.pop();
        assert!(decode_npy(&bytes).is_err());
        assert!(decode_npy(b"PK\x03\x04").is_err());
    }

    #[test]
    fn file_round_trip_2d() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1326030975726043.npz");
        let array = Descriptor::new(vec![2, 3], vec![0.5, -1.0, 3.25, f32::MIN_POSITIVE, 0.0, -0.0]).unwrap();
        write_array(&path, "descriptor", &array).unwrap();
        let back = read_array(&path, "descriptor").unwrap();
        assert_eq!(back.shape(), &[2, 3]);
        let bits = |d: &Descriptor| d.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back), bits(&array));
    }

    #[test]
    fn missing_array_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npz");
        write_array(&path, "descriptor", &Descriptor::from_vec(vec![1.0])).unwrap();
        assert!(matches!(
            read_array(&path, "global"),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn same_array_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npz");
        let array = Descriptor::from_vec((0..256).map(|i| i as f32 / 7.0).collect());
        write_array(&path, "descriptor", &array).unwrap();
        let first = std::fs::read(&path).unwrap();
        write_array(&path, "descriptor", &array).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn bit_exact_round_trip(values: Vec<f32>) -> bool {
        // Includes NaN and infinities.
        let array = Descriptor::from_vec(values);
        let bytes = encode_npy(&array).unwrap();
        let back = decode_npy(&bytes).unwrap();
        back.shape() == array.shape()
            && back
                .data()
                .iter()
                .zip(array.data())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}
