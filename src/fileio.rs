//! File I/O primitives (C1).
//!
//! Four operations on absolute paths, each opening its own handle. Handle
//! caching across calls is a permitted optimization elsewhere in the
//! crate but is not done here — this module is the baseline contract.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{IoResultExt, Result};

/// Returns the size of `path` in bytes, or `None` if it does not exist.
/// Any other I/O failure (permission denied, etc.) is propagated.
pub fn size(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_path(path),
    }
}

/// Reads up to `length` bytes starting at `offset`. Returns fewer bytes
/// only at end-of-file; any other I/O failure is propagated.
pub fn read(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_path(path)?;
    file.seek(SeekFrom::Start(offset)).with_path(path)?;
    let mut buf = vec![0u8; length as usize];
    let mut total = 0usize;
    loop {
        if total == buf.len() {
            break;
        }
        let n = file.read(&mut buf[total..]).with_path(path)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    buf.truncate(total);
    Ok(buf)
}

/// Writes `data` at `offset` and flushes to the kernel. The path must
/// already exist and be large enough to hold the write — the delta
/// coordinator guarantees this by resizing the target before dispatch.
pub fn write(path: &Path, offset: u64, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_path(path)?;
    file.seek(SeekFrom::Start(offset)).with_path(path)?;
    file.write_all(data).with_path(path)?;
    file.flush().with_path(path)?;
    Ok(())
}

/// Creates or resizes `path` to `new_size`, truncating or extending as
/// needed. If the path does not exist, any missing parent directories and
/// the file itself are created first. Bytes added by growing the file are
/// unspecified (typically a sparse zero-filled region).
pub fn resize(path: &Path, new_size: u64) -> Result<()> {
    let file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_path(parent)?;
                }
            }
            OpenOptions::new()
                .write(true)
                .create(true)
                .open(path)
                .with_path(path)?
        }
        Err(e) => return Err(e).with_path(path),
    };
    file.set_len(new_size).with_path(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn size_is_none_for_absent_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.bin");
        assert_eq!(size(&path).unwrap(), None);
    }

    #[test]
    fn size_reports_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(size(&path).unwrap(), Some(11));
    }

    #[test]
    fn resize_creates_missing_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("file.bin");
        resize(&path, 4096).unwrap();
        assert_eq!(size(&path).unwrap(), Some(4096));
    }

    #[test]
    fn resize_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, vec![1u8; 100]).unwrap();
        resize(&path, 10).unwrap();
        assert_eq!(size(&path).unwrap(), Some(10));
        resize(&path, 200).unwrap();
        assert_eq!(size(&path).unwrap(), Some(200));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        resize(&path, 64).unwrap();
        write(&path, 16, b"block-data").unwrap();
        let got = read(&path, 16, 10).unwrap();
        assert_eq!(got, b"block-data");
    }

    #[test]
    fn read_past_eof_returns_short_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"12345").unwrap();
        let got = read(&path, 3, 100).unwrap();
        assert_eq!(got, b"45");
    }
}
