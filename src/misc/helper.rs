// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

use std::fs;
use std::path::{Path, PathBuf};

/// Compute the quotient and remainder of x/y both at the same time.
pub fn div_rem<T>(x: T, y: T) -> (T, T)
where
    T: std::ops::Div<Output = T> + std::ops::Rem<Output = T> + Copy,
{
    (x / y, x % y)
}

/// Write a file through a temporary sibling, then move it in place.
///
/// An interrupted write leaves at most a `.tmp` file behind,
/// never a truncated file at `file_path`.
pub fn write_atomic<P, F>(file_path: P, write: F) -> std::io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    let file_path = file_path.as_ref();
    let tmp_path = tmp_sibling(file_path);
    if let Err(e) = write(&tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, file_path)
}

fn tmp_sibling(file_path: &Path) -> PathBuf {
    let mut name = file_path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    file_path.with_file_name(name)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn div_rem_index() {
        assert_eq!(div_rem(17_usize, 5), (3, 2));
    }

    #[test]
    fn atomic_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npz");
        fs::write(&path, b"old content").unwrap();
        write_atomic(&path, |tmp| fs::write(tmp, b"new")).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!dir.path().join("a.npz.tmp").exists());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.npz");
        fs::write(&path, b"old").unwrap();
        let res = write_atomic(&path, |tmp| {
            fs::write(tmp, b"partial")?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "interrupted"))
        });
        assert!(res.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"old");
        assert!(!dir.path().join("b.npz.tmp").exists());
    }
}
