//! C Foreign Function Interface (FFI) for the COMTRADE record reader
//!
//! This module provides a C-compatible API for decoding COMTRADE file pairs
//! from C, C++, and other languages that support C FFI.

use comtrade_core::{read, read_pair, DecodedRecord, FilePair};
use std::cell::RefCell;
use std::ffi::{c_char, c_double, c_int, CStr, CString};
use std::ptr;
use std::sync::Once;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Layout of timestamps handed to C callers
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ============================================================================
// Opaque Types for C
// ============================================================================

/// Opaque handle to a decoded record
pub struct CComtradeRecord {
    inner: Box<DecodedRecord>,
    cached_station: CString,
    cached_device: CString,
    cached_start: CString,
    cached_trigger: CString,
    cached_channel_ids: Vec<CString>,
    cached_units: Vec<CString>,
    cached_phases: Vec<CString>,
    cached_status_ids: Vec<CString>,
}

impl CComtradeRecord {
    fn new(record: DecodedRecord) -> Self {
        let cstr = |s: &str| CString::new(s).unwrap_or_default();

        let schema = &record.schema;
        Self {
            cached_station: cstr(schema.station()),
            cached_device: cstr(schema.device()),
            cached_start: cstr(&schema.start().format(TIME_FORMAT).to_string()),
            cached_trigger: cstr(&schema.trigger().format(TIME_FORMAT).to_string()),
            cached_channel_ids: schema.channels().iter().map(|c| cstr(&c.id)).collect(),
            cached_units: schema.channels().iter().map(|c| cstr(&c.unit)).collect(),
            cached_phases: schema.channels().iter().map(|c| cstr(&c.phase)).collect(),
            cached_status_ids: schema
                .status_channels()
                .iter()
                .map(|s| cstr(&s.id))
                .collect(),
            inner: Box::new(record),
        }
    }
}

// ============================================================================
// Logging and Errors
// ============================================================================

static LOGGING: Once = Once::new();

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: String) {
    warn!(error = %msg, "comtrade call failed");
    LAST_ERROR.with(|e| *e.borrow_mut() = CString::new(msg).ok());
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Install a `tracing` subscriber writing to stderr, filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call has an effect.
#[no_mangle]
pub extern "C" fn comtrade_init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Message of the last failed call on this thread, or NULL.
///
/// The pointer stays valid until the next failing call on the same thread.
#[no_mangle]
pub extern "C" fn comtrade_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

unsafe fn c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        set_last_error("null path".into());
        return None;
    }
    match CStr::from_ptr(s).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error("path is not valid UTF-8".into());
            None
        }
    }
}

fn into_handle(result: comtrade_core::Result<DecodedRecord>) -> *mut CComtradeRecord {
    match result {
        Ok(record) => {
            clear_last_error();
            Box::into_raw(Box::new(CComtradeRecord::new(record)))
        }
        Err(e) => {
            set_last_error(e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Record Creation and Destruction
// ============================================================================

/// Read the CFG/DAT pair sharing `base` and return a record handle.
#[no_mangle]
pub unsafe extern "C" fn comtrade_read(base: *const c_char) -> *mut CComtradeRecord {
    match c_str(base) {
        Some(base) => into_handle(read(base)),
        None => ptr::null_mut(),
    }
}

/// Read an explicit CFG/DAT pair and return a record handle.
#[no_mangle]
pub unsafe extern "C" fn comtrade_read_pair(
    cfg_path: *const c_char,
    dat_path: *const c_char,
) -> *mut CComtradeRecord {
    match (c_str(cfg_path), c_str(dat_path)) {
        (Some(cfg), Some(dat)) => into_handle(read_pair(FilePair::new(cfg, dat))),
        _ => ptr::null_mut(),
    }
}

/// Free a record handle.
#[no_mangle]
pub unsafe extern "C" fn comtrade_free(record: *mut CComtradeRecord) {
    if !record.is_null() {
        drop(Box::from_raw(record));
    }
}

// ============================================================================
// Metadata Accessors
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_station(record: *const CComtradeRecord) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    (*record).cached_station.as_ptr()
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_device(record: *const CComtradeRecord) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    (*record).cached_device.as_ptr()
}

/// Start timestamp as `YYYY-MM-DD HH:MM:SS.ffffff`
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_start_time(record: *const CComtradeRecord) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    (*record).cached_start.as_ptr()
}

/// Trigger timestamp as `YYYY-MM-DD HH:MM:SS.ffffff`
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_trigger_time(
    record: *const CComtradeRecord,
) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    (*record).cached_trigger.as_ptr()
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_line_frequency(record: *const CComtradeRecord) -> c_double {
    if record.is_null() {
        return 0.0;
    }
    (*record).inner.schema.line_frequency()
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_analog_count(record: *const CComtradeRecord) -> c_int {
    if record.is_null() {
        return 0;
    }
    c_count((*record).inner.channels.len())
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_status_count(record: *const CComtradeRecord) -> c_int {
    if record.is_null() {
        return 0;
    }
    c_count((*record).inner.status.len())
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_sample_count(record: *const CComtradeRecord) -> c_int {
    if record.is_null() {
        return 0;
    }
    c_count((*record).inner.len())
}

/// Count as a C int, -1 when it does not fit
fn c_count(n: usize) -> c_int {
    c_int::try_from(n).unwrap_or(-1)
}

// ============================================================================
// Channel Accessors
// ============================================================================

fn cached_name(names: &[CString], index: c_int) -> *const c_char {
    if index < 0 {
        return ptr::null();
    }
    names
        .get(index as usize)
        .map(|s| s.as_ptr())
        .unwrap_or(ptr::null())
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_channel_id(
    record: *const CComtradeRecord,
    index: c_int,
) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    cached_name(&(*record).cached_channel_ids, index)
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_channel_unit(
    record: *const CComtradeRecord,
    index: c_int,
) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    cached_name(&(*record).cached_units, index)
}

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_channel_phase(
    record: *const CComtradeRecord,
    index: c_int,
) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    cached_name(&(*record).cached_phases, index)
}

/// Channel multiplier `a` and offset `b`. Returns 0 on success, -1 otherwise.
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_channel_scaling(
    record: *const CComtradeRecord,
    index: c_int,
    out_a: *mut c_double,
    out_b: *mut c_double,
) -> c_int {
    if record.is_null() || out_a.is_null() || out_b.is_null() || index < 0 {
        return -1;
    }
    match (&(*record).inner.channels).get(index as usize) {
        Some(ch) => {
            *out_a = ch.descriptor.a;
            *out_b = ch.descriptor.b;
            0
        }
        None => -1,
    }
}

/// Copy primary values of channel `index`. Returns the count copied, or -1.
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_primary_data(
    record: *const CComtradeRecord,
    index: c_int,
    out_buffer: *mut c_double,
    max_count: c_int,
) -> c_int {
    if record.is_null() || out_buffer.is_null() || index < 0 || max_count <= 0 {
        return -1;
    }

    match (&(*record).inner.channels).get(index as usize) {
        Some(ch) => {
            let count = std::cmp::min(ch.primary.len(), max_count as usize);
            ptr::copy_nonoverlapping(ch.primary.as_ptr(), out_buffer, count);
            count as c_int
        }
        None => -1,
    }
}

/// Copy raw samples of channel `index`. Returns the count copied, or -1.
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_raw_data(
    record: *const CComtradeRecord,
    index: c_int,
    out_buffer: *mut i16,
    max_count: c_int,
) -> c_int {
    if record.is_null() || out_buffer.is_null() || index < 0 || max_count <= 0 {
        return -1;
    }

    match (&(*record).inner.channels).get(index as usize) {
        Some(ch) => {
            let count = std::cmp::min(ch.raw.len(), max_count as usize);
            ptr::copy_nonoverlapping(ch.raw.as_ptr(), out_buffer, count);
            count as c_int
        }
        None => -1,
    }
}

// ============================================================================
// Status Channel Accessors
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn comtrade_get_status_id(
    record: *const CComtradeRecord,
    index: c_int,
) -> *const c_char {
    if record.is_null() {
        return ptr::null();
    }
    cached_name(&(*record).cached_status_ids, index)
}

/// Copy status bits of channel `index` as 0/1 bytes. Returns the count, or -1.
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_status_data(
    record: *const CComtradeRecord,
    index: c_int,
    out_buffer: *mut u8,
    max_count: c_int,
) -> c_int {
    if record.is_null() || out_buffer.is_null() || index < 0 || max_count <= 0 {
        return -1;
    }

    match (&(*record).inner.status).get(index as usize) {
        Some(st) => {
            let count = std::cmp::min(st.values.len(), max_count as usize);
            for (i, &bit) in st.values.iter().take(count).enumerate() {
                *out_buffer.add(i) = bit as u8;
            }
            count as c_int
        }
        None => -1,
    }
}

// ============================================================================
// Time Accessors
// ============================================================================

/// Copy per-sample offsets from the start timestamp, in microseconds.
/// Returns the count copied, or -1.
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_time_offsets(
    record: *const CComtradeRecord,
    out_buffer: *mut c_double,
    max_count: c_int,
) -> c_int {
    if record.is_null() || out_buffer.is_null() || max_count <= 0 {
        return -1;
    }

    let offsets = (*record).inner.timeline().offsets_micros();
    let count = std::cmp::min(offsets.len(), max_count as usize);
    ptr::copy_nonoverlapping(offsets.as_ptr(), out_buffer, count);
    count as c_int
}

/// Sample interval in microseconds
#[no_mangle]
pub unsafe extern "C" fn comtrade_get_sample_interval(record: *const CComtradeRecord) -> c_double {
    if record.is_null() {
        return 0.0;
    }
    let interval = (*record).inner.schema.sample_interval();
    interval.num_nanoseconds().unwrap_or(0) as f64 / 1_000.0
}
