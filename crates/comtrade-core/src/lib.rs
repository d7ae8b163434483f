//! # COMTRADE Record Reader - Core Library
//!
//! Decodes COMTRADE configuration/data file pairs written by power-system
//! fault recorders into per-channel sample sequences in engineering units.
//!
//! ## Supported Formats
//!
//! - Configuration files of the 1999 revision (`.CFG`); 1991 files, which
//!   lack the time multiplier line, are rejected
//! - Binary data files (`.DAT`, 16-bit samples)
//!
//! ## Features
//!
//! - Validating configuration parser: malformed files fail loudly
//! - Lazy, restartable frame decoding over memory-mapped data files
//! - Linear channel scaling (`raw * a + b`) with transformer-side conversion
//! - Per-channel peak magnitude lookup
//! - Absolute per-sample timestamps from start/trigger times
//! - Structured logging via `tracing` for diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use comtrade_core::read;
//!
//! let record = read("records/20220106_141932").unwrap();
//! println!("Station: {}", record.schema.station());
//!
//! if let Some(ia) = record.get("IA") {
//!     println!("IA: {} samples, first {} {}", ia.len(), ia.primary[0], ia.descriptor.unit);
//! }
//!
//! for (ts, value) in record.timeline().zip(&record.channels[0].primary) {
//!     println!("{} {}", ts, value);
//! }
//! ```
//!
//! ## Lazy Frame Access
//!
//! ```rust,no_run
//! use comtrade_core::FilePair;
//!
//! let pending = FilePair::from_base("records/20220106_141932")
//!     .unwrap()
//!     .load_schema()
//!     .unwrap();
//! for frame in pending.frames().unwrap() {
//!     let frame = frame.unwrap();
//!     println!("#{} @{}us {:?}", frame.sample, frame.timestamp, frame.analog);
//! }
//! ```
//!
//! ## Enabling Logging
//!
//! This library uses `tracing` for structured logging. To see log output,
//! initialize a tracing subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//!
//! let record = comtrade_core::read("records/20220106_141932").unwrap();
//! ```

mod config;
mod frame_decoder;
mod record;
mod scaling;
mod stream;
mod timeline;
mod types;

// Re-export public types
pub use types::{
    ChannelDescriptor,
    // Error types
    ComtradeError,
    DataEncoding,
    DecodedChannel,
    DecodedRecord,
    DecodedStatus,
    RawFrame,
    RecordSchema,
    Result,
    SampleRate,
    ScalingMode,
    StatusChannelDescriptor,
    // Constants
    BINARY_MARKER,
    FRAME_HEADER_LEN,
    STATUS_BITS_PER_WORD,
    TIMESTAMP_FORMAT,
};

pub use config::{parse_config, read_config};
pub use frame_decoder::{FrameDecoder, FrameLayout};
pub use record::{decode, read, read_pair, FilePair, PendingRecord};
pub use scaling::{peak, primary_side_value, primary_value, scale_all, secondary_value};
pub use stream::{frames, DatFile, DataSource, MappedBytes};
pub use timeline::{parse_timestamp, sample_interval, Timeline};
