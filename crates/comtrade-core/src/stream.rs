//! Re-openable binary data sources
//!
//! Frame decoding is restartable: a [`DataSource`] hands out a fresh reader
//! positioned at byte 0 every time it is opened, so the same record can be
//! walked any number of times without holding the decoded frames in memory.
//!
//! Data files are memory-mapped. The mapping lives inside the returned reader
//! and is released when the reader is dropped, on success or error.

use crate::frame_decoder::FrameDecoder;
use crate::types::{RecordSchema, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A byte stream that can be reopened from the start
pub trait DataSource {
    type Reader: Read;

    /// Open a new reader positioned at the first byte
    fn open(&self) -> Result<Self::Reader>;

    /// Total byte length, when known without reading
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

impl<'a> DataSource for &'a [u8] {
    type Reader = &'a [u8];

    fn open(&self) -> Result<Self::Reader> {
        Ok(*self)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Memory-mapped binary data file
#[derive(Debug, Clone)]
pub struct DatFile {
    path: PathBuf,
}

impl DatFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bytes of a mapped data file. Empty files are not mapped.
pub enum MappedBytes {
    Mapped(Mmap),
    Empty,
}

impl AsRef<[u8]> for MappedBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            MappedBytes::Mapped(mmap) => &mmap[..],
            MappedBytes::Empty => &[],
        }
    }
}

impl DataSource for DatFile {
    type Reader = Cursor<MappedBytes>;

    fn open(&self) -> Result<Self::Reader> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let bytes = if len == 0 {
            MappedBytes::Empty
        } else {
            MappedBytes::Mapped(unsafe { Mmap::map(&file)? })
        };
        debug!(
            path = %self.path.display(),
            bytes = len,
            "Data file mapped"
        );
        Ok(Cursor::new(bytes))
    }

    fn len_hint(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

/// Open a fresh frame sequence over `source`.
///
/// Calling this again on the same source restarts decoding from the first
/// frame and yields an identical sequence.
pub fn frames<S: DataSource + ?Sized>(
    schema: &RecordSchema,
    source: &S,
) -> Result<FrameDecoder<S::Reader>> {
    Ok(FrameDecoder::new(source.open()?, schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_source_reopens_at_start() {
        let data: &[u8] = &[1, 2, 3, 4];
        let mut first = Vec::new();
        data.open().unwrap().read_to_end(&mut first).unwrap();
        let mut second = Vec::new();
        data.open().unwrap().read_to_end(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(data.len_hint(), Some(4));
    }

    #[test]
    fn test_dat_file_source() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9, 8, 7]).unwrap();
        tmp.flush().unwrap();

        let source = DatFile::new(tmp.path());
        assert_eq!(source.len_hint(), Some(3));
        for _ in 0..2 {
            let mut buf = Vec::new();
            source.open().unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, vec![9, 8, 7]);
        }
    }

    #[test]
    fn test_empty_dat_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let source = DatFile::new(tmp.path());
        let mut buf = Vec::new();
        source.open().unwrap().read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_missing_dat_file() {
        let source = DatFile::new("/nonexistent/record.DAT");
        assert!(source.open().is_err());
        assert_eq!(source.len_hint(), None);
    }
}
