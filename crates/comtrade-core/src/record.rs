//! Record pipeline: configuration + data file pair to decoded channels
//!
//! A pair moves through `FilePair` (unparsed) -> `PendingRecord` (schema
//! ready) -> `FrameDecoder` (decoding) -> `DecodedRecord`. Each step consumes
//! the previous one.

use crate::config::read_config;
use crate::scaling::scale_all;
use crate::stream::{frames, DatFile, DataSource};
use crate::types::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Upper bound on pre-allocated samples when the source length is unknown
const MAX_PREALLOC: usize = 1 << 20;

const CFG_EXTENSIONS: [&str; 2] = ["CFG", "cfg"];
const DAT_EXTENSIONS: [&str; 2] = ["DAT", "dat"];

// ============================================================================
// File Pair
// ============================================================================

/// Configuration and data file sharing one base name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    cfg: PathBuf,
    dat: PathBuf,
}

impl FilePair {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(cfg: P, dat: Q) -> Self {
        Self {
            cfg: cfg.as_ref().to_path_buf(),
            dat: dat.as_ref().to_path_buf(),
        }
    }

    /// Resolve `base.CFG` / `base.DAT`, falling back to lower-case extensions
    pub fn from_base<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref();
        Ok(Self {
            cfg: find_with_extension(base, &CFG_EXTENSIONS)?,
            dat: find_with_extension(base, &DAT_EXTENSIONS)?,
        })
    }

    pub fn cfg_path(&self) -> &Path {
        &self.cfg
    }

    pub fn dat_path(&self) -> &Path {
        &self.dat
    }

    /// Parse the configuration file. The data file is not touched.
    pub fn load_schema(self) -> Result<PendingRecord<DatFile>> {
        let schema = read_config(&self.cfg)?;
        Ok(PendingRecord::new(schema, DatFile::new(&self.dat)))
    }
}

fn find_with_extension(base: &Path, extensions: &[&str]) -> Result<PathBuf> {
    extensions
        .iter()
        .map(|ext| {
            let mut name = base.as_os_str().to_owned();
            name.push(".");
            name.push(ext);
            PathBuf::from(name)
        })
        .find(|p| p.is_file())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "no {} file for '{}'",
                    extensions.join("/"),
                    base.display()
                ),
            )
            .into()
        })
}

// ============================================================================
// Pending Record
// ============================================================================

/// Schema paired with its (not yet read) data source
#[derive(Debug, Clone)]
pub struct PendingRecord<S> {
    schema: RecordSchema,
    source: S,
}

impl<S: DataSource> PendingRecord<S> {
    pub fn new(schema: RecordSchema, source: S) -> Self {
        Self { schema, source }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Lazily decode raw frames. Each call starts from the first frame.
    pub fn frames(&self) -> Result<crate::frame_decoder::FrameDecoder<S::Reader>> {
        frames(&self.schema, &self.source)
    }

    /// Decode every frame and scale all channels
    pub fn decode(self) -> Result<DecodedRecord> {
        decode(self.schema, &self.source)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode all frames of `source` against `schema`.
///
/// Either every channel is returned with exactly `sample_count` samples or
/// an error is returned; there is no partial result.
pub fn decode<S: DataSource + ?Sized>(schema: RecordSchema, source: &S) -> Result<DecodedRecord> {
    let n = schema.sample_count();
    let frame_len = schema.frame_len();

    // Fail fast when the source is known to be short. A byte count that
    // overflows u64 is longer than any source.
    if let Some(len) = source.len_hint() {
        let needed = u64::try_from(n)
            .ok()
            .and_then(|n| n.checked_mul(frame_len as u64));
        if needed.map_or(true, |needed| len < needed) {
            return Err(ComtradeError::TruncatedFrame {
                frame: (len / frame_len as u64) as usize,
                expected: frame_len,
                received: (len % frame_len as u64) as usize,
            });
        }
    }

    let capacity = if source.len_hint().is_some() {
        n
    } else {
        n.min(MAX_PREALLOC)
    };

    debug!(
        frames = n,
        frame_len,
        analog = schema.analog_count(),
        status_words = schema.status_words(),
        "Decoding frames"
    );

    let mut raw: Vec<Vec<i16>> = (0..schema.analog_count())
        .map(|_| Vec::with_capacity(capacity))
        .collect();
    let mut bits: Vec<Vec<bool>> = (0..schema.status_count())
        .map(|_| Vec::with_capacity(capacity))
        .collect();
    let mut relative_times = Vec::with_capacity(capacity);

    for frame in frames(&schema, source)? {
        let frame = frame?;
        relative_times.push(frame.timestamp);
        for (samples, &value) in raw.iter_mut().zip(&frame.analog) {
            samples.push(value);
        }
        for (k, samples) in bits.iter_mut().enumerate() {
            samples.push(frame.status_bit(k).unwrap_or(false));
        }
    }

    let channels = schema
        .channels()
        .iter()
        .zip(raw)
        .map(|(descriptor, raw)| DecodedChannel {
            primary: scale_all(&raw, descriptor),
            descriptor: descriptor.clone(),
            raw,
        })
        .collect();

    let status = schema
        .status_channels()
        .iter()
        .zip(bits)
        .map(|(descriptor, values)| DecodedStatus {
            descriptor: descriptor.clone(),
            values,
        })
        .collect();

    Ok(DecodedRecord {
        schema,
        channels,
        status,
        relative_times,
    })
}

/// Read and decode the file pair sharing `base` as base name.
///
/// The configuration is fully validated before the data file is opened.
#[instrument(skip_all, fields(base = %base.as_ref().display()))]
pub fn read<P: AsRef<Path>>(base: P) -> Result<DecodedRecord> {
    read_pair(FilePair::from_base(base)?)
}

/// Read and decode an explicit file pair
pub fn read_pair(pair: FilePair) -> Result<DecodedRecord> {
    let record = pair.load_schema()?.decode()?;
    info!(
        station = %record.schema.station(),
        device = %record.schema.device(),
        channels = record.channels.len(),
        samples = record.len(),
        "Record decoded"
    );
    Ok(record)
}
