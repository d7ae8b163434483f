//! Common types, errors, and constants for COMTRADE record decoding

use chrono::{NaiveDateTime, TimeDelta};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Data-encoding marker accepted on the second-to-last configuration line
pub const BINARY_MARKER: &str = "BINARY";

/// Status channels packed into one 16-bit status word
pub const STATUS_BITS_PER_WORD: usize = 16;

/// Sample number (u32) + relative timestamp (u32)
pub const FRAME_HEADER_LEN: usize = 8;

/// Textual timestamp layout once date and time fields are joined by a space
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.f";

// ============================================================================
// Error Types
// ============================================================================

/// Error type for COMTRADE decoding operations
#[derive(Debug, Error)]
pub enum ComtradeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported configuration text
    #[error("Format error: {0}")]
    Format(String),

    /// Binary data ended before the declared number of frames
    #[error(
        "Truncated frame: frame {frame} needs {expected} bytes, only {received} available"
    )]
    TruncatedFrame {
        frame: usize,
        expected: usize,
        received: usize,
    },

    /// Unparsable or inconsistent timestamp text
    #[error("Time format error: {0}")]
    TimeFormat(String),
}

impl ComtradeError {
    pub(crate) fn format(line: usize, msg: impl std::fmt::Display) -> Self {
        ComtradeError::Format(format!("line {}: {}", line, msg))
    }
}

pub type Result<T> = std::result::Result<T, ComtradeError>;

// ============================================================================
// Enums
// ============================================================================

/// Whether a channel's `a`/`b` factors yield primary or secondary values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    Primary,
    Secondary,
}

impl ScalingMode {
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "P" | "p" => Some(ScalingMode::Primary),
            "S" | "s" => Some(ScalingMode::Secondary),
            _ => None,
        }
    }
}

/// Data file encoding. Only binary frames are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEncoding {
    Binary,
}

// ============================================================================
// Channel Descriptors
// ============================================================================

/// Analog channel row from the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    /// 1-based analog channel number (`An`)
    pub index: u32,
    /// Channel identifier (`ch_id`)
    pub id: String,
    /// Phase label (`ph`)
    pub phase: String,
    /// Circuit component being monitored (`ccbm`)
    pub circuit: String,
    /// Unit string (`uu`)
    pub unit: String,
    /// Multiplier `a`
    pub a: f64,
    /// Offset `b`
    pub b: f64,
    /// Time skew from the start of the sample period, microseconds
    pub skew: f64,
    /// Declared lower raw bound (informational)
    pub min: i32,
    /// Declared upper raw bound (informational)
    pub max: i32,
    /// Transformer ratio primary factor
    pub primary: f64,
    /// Transformer ratio secondary factor
    pub secondary: f64,
    pub scaling: ScalingMode,
}

/// Status (digital) channel row from the configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChannelDescriptor {
    /// 1-based status channel number (`Dn`)
    pub index: u32,
    pub id: String,
    pub phase: String,
    pub circuit: String,
    /// Normal state of the contact (`y`)
    pub normal_state: bool,
}

/// One row of the sample-rate table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate {
    /// Sample rate in Hz (0 when the recorder has no fixed rate)
    pub rate_hz: f64,
    /// Last sample number at this rate
    pub end_sample: usize,
}

// ============================================================================
// Record Schema
// ============================================================================

/// Parsed configuration file. Built once by the configuration parser and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub(crate) station: String,
    pub(crate) device: String,
    pub(crate) revision: Option<u16>,
    pub(crate) channels: Vec<ChannelDescriptor>,
    pub(crate) status_channels: Vec<StatusChannelDescriptor>,
    pub(crate) status_words: usize,
    pub(crate) line_frequency: f64,
    pub(crate) sample_rates: Vec<SampleRate>,
    pub(crate) sample_count: usize,
    pub(crate) start: NaiveDateTime,
    pub(crate) trigger: NaiveDateTime,
    pub(crate) sample_interval: TimeDelta,
    pub(crate) encoding: DataEncoding,
    pub(crate) time_multiplier: f64,
}

impl RecordSchema {
    /// Station name (line 1)
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Recording device id (line 1)
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Standard revision year; `None` for the original 1991 layout
    pub fn revision(&self) -> Option<u16> {
        self.revision
    }

    pub fn analog_count(&self) -> usize {
        self.channels.len()
    }

    /// Declared number of status channels (bits)
    pub fn status_count(&self) -> usize {
        self.status_channels.len()
    }

    /// Number of 16-bit status words per frame
    pub fn status_words(&self) -> usize {
        self.status_words
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn status_channels(&self) -> &[StatusChannelDescriptor] {
        &self.status_channels
    }

    /// Look up an analog channel by its identifier
    pub fn channel(&self, id: &str) -> Option<&ChannelDescriptor> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn line_frequency(&self) -> f64 {
        self.line_frequency
    }

    pub fn sample_rates(&self) -> &[SampleRate] {
        &self.sample_rates
    }

    /// Total number of frames in the data file
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn trigger(&self) -> NaiveDateTime {
        self.trigger
    }

    /// `(trigger - start) / sample_count`, fixed at parse time
    pub fn sample_interval(&self) -> TimeDelta {
        self.sample_interval
    }

    pub fn encoding(&self) -> DataEncoding {
        self.encoding
    }

    pub fn time_multiplier(&self) -> f64 {
        self.time_multiplier
    }

    /// Byte length of one binary frame: `8 + 2*Na + 2*Ns`
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + 2 * self.analog_count() + 2 * self.status_words
    }
}

// ============================================================================
// Frames and Decoded Data
// ============================================================================

/// One binary data frame, before scaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Sample number as written by the recorder
    pub sample: u32,
    /// Time offset from the first sample, microseconds (before time multiplier)
    pub timestamp: u32,
    pub analog: Vec<i16>,
    pub status: Vec<u16>,
}

impl RawFrame {
    /// State of status channel `channel` (0-based). Bits are packed LSB first.
    pub fn status_bit(&self, channel: usize) -> Option<bool> {
        let word = self.status.get(channel / STATUS_BITS_PER_WORD)?;
        Some(word & (1 << (channel % STATUS_BITS_PER_WORD)) != 0)
    }
}

/// Analog channel with raw and scaled samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannel {
    pub descriptor: ChannelDescriptor,
    pub raw: Vec<i16>,
    pub primary: Vec<f64>,
}

impl DecodedChannel {
    #[inline]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Sample index and magnitude of the largest `|primary|` value
    pub fn peak(&self) -> Option<(usize, f64)> {
        crate::scaling::peak(&self.primary)
    }
}

/// Status channel with one bit per sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStatus {
    pub descriptor: StatusChannelDescriptor,
    pub values: Vec<bool>,
}

/// Fully decoded record
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub schema: RecordSchema,
    pub channels: Vec<DecodedChannel>,
    pub status: Vec<DecodedStatus>,
    /// Per-frame relative timestamps from the data file, microseconds
    pub relative_times: Vec<u32>,
}

impl DecodedRecord {
    /// Number of samples per channel
    pub fn len(&self) -> usize {
        self.schema.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.schema.sample_count == 0
    }

    /// Get an analog channel by identifier
    pub fn get(&self, id: &str) -> Option<&DecodedChannel> {
        self.channels.iter().find(|c| c.descriptor.id == id)
    }

    /// Get a status channel by identifier
    pub fn get_status(&self, id: &str) -> Option<&DecodedStatus> {
        self.status.iter().find(|s| s.descriptor.id == id)
    }

    /// Absolute per-sample timestamps derived from start/trigger
    pub fn timeline(&self) -> crate::timeline::Timeline {
        crate::timeline::Timeline::from_schema(&self.schema)
    }
}
