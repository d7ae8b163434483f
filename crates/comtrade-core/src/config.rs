//! COMTRADE configuration (.CFG) parser
//!
//! The configuration file is line oriented with comma separated fields:
//!
//! ```text
//! station_name,rec_dev_id,rev_year
//! TT,##A,##D
//! An,ch_id,ph,ccbm,uu,a,b,skew,min,max,primary,secondary,PS   (x ##A)
//! Dn,ch_id,ph,ccbm,y                                          (x ##D)
//! lf
//! nrates
//! samp,endsamp                                                (x nrates)
//! dd/mm/yyyy,hh:mm:ss.ssssss                                  (first sample)
//! dd/mm/yyyy,hh:mm:ss.ssssss                                  (trigger)
//! ft
//! timemult
//! ```
//!
//! The header is walked top-down and the result must land exactly on the
//! fixed five-line trailer. Any disagreement is reported as a format error
//! instead of silently reading the wrong line.

use crate::timeline::{parse_timestamp, sample_interval};
use crate::types::*;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Lines after the last sample-rate row: start, trigger, ft, timemult
const TRAILER_AFTER_RATES: usize = 4;

const ANALOG_FIELDS: usize = 13;
const STATUS_FIELDS: usize = 5;

// ============================================================================
// Line cursor
// ============================================================================

/// Configuration split into trimmed fields, with a forward cursor
struct ConfigLines<'a> {
    rows: Vec<Vec<&'a str>>,
    pos: usize,
}

impl<'a> ConfigLines<'a> {
    fn new(text: &'a str) -> Self {
        let mut lines: Vec<&str> = text.lines().collect();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        let rows = lines
            .into_iter()
            .map(|l| l.split(',').map(str::trim).collect())
            .collect();
        Self { rows, pos: 0 }
    }

    #[inline]
    fn len(&self) -> usize {
        self.rows.len()
    }

    /// Row at absolute position, with its 1-based line number
    fn at(&self, idx: usize, min_fields: usize, what: &str) -> Result<(usize, &[&'a str])> {
        let line = idx + 1;
        let row = self.rows.get(idx).ok_or_else(|| {
            ComtradeError::format(line, format!("missing {} line", what))
        })?;
        if row.len() < min_fields {
            return Err(ComtradeError::format(
                line,
                format!(
                    "{} needs {} fields, found {}",
                    what,
                    min_fields,
                    row.len()
                ),
            ));
        }
        Ok((line, row.as_slice()))
    }

    /// Row counted back from the end (1 = last line)
    fn from_end(&self, back: usize, min_fields: usize, what: &str) -> Result<(usize, &[&'a str])> {
        if back > self.rows.len() {
            return Err(ComtradeError::Format(format!(
                "configuration has {} lines, too short for {} line",
                self.rows.len(),
                what
            )));
        }
        self.at(self.rows.len() - back, min_fields, what)
    }

    fn next_row(&mut self, min_fields: usize, what: &str) -> Result<(usize, &[&'a str])> {
        let idx = self.pos;
        self.pos += 1;
        self.at(idx, min_fields, what)
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn parse_field<T: FromStr>(fields: &[&str], idx: usize, line: usize, name: &str) -> Result<T> {
    let raw = fields.get(idx).copied().unwrap_or("");
    raw.parse()
        .map_err(|_| ComtradeError::format(line, format!("invalid {} '{}'", name, raw)))
}

/// Parse a count such as `12A` or `4D`
fn parse_count(field: &str, suffix: char, line: usize, name: &str) -> Result<usize> {
    let digits = field
        .strip_suffix(suffix)
        .or_else(|| field.strip_suffix(suffix.to_ascii_lowercase()))
        .ok_or_else(|| {
            ComtradeError::format(
                line,
                format!("{} '{}' lacks the '{}' suffix", name, field, suffix),
            )
        })?;
    digits
        .trim()
        .parse()
        .map_err(|_| ComtradeError::format(line, format!("invalid {} '{}'", name, field)))
}

// ============================================================================
// Row parsers
// ============================================================================

fn parse_analog_row(fields: &[&str], line: usize) -> Result<ChannelDescriptor> {
    let flag = fields[12];
    let scaling = ScalingMode::from_flag(flag).ok_or_else(|| {
        ComtradeError::format(line, format!("invalid scaling identifier '{}'", flag))
    })?;

    Ok(ChannelDescriptor {
        index: parse_field(fields, 0, line, "analog channel index")?,
        id: fields[1].to_string(),
        phase: fields[2].to_string(),
        circuit: fields[3].to_string(),
        unit: fields[4].to_string(),
        a: parse_field(fields, 5, line, "multiplier")?,
        b: parse_field(fields, 6, line, "offset")?,
        skew: parse_field(fields, 7, line, "skew")?,
        min: parse_field(fields, 8, line, "min")?,
        max: parse_field(fields, 9, line, "max")?,
        primary: parse_field(fields, 10, line, "primary factor")?,
        secondary: parse_field(fields, 11, line, "secondary factor")?,
        scaling,
    })
}

fn parse_status_row(fields: &[&str], line: usize) -> Result<StatusChannelDescriptor> {
    let normal_state = match fields[4] {
        "0" => false,
        "1" => true,
        other => {
            return Err(ComtradeError::format(
                line,
                format!("invalid normal state '{}'", other),
            ))
        }
    };

    Ok(StatusChannelDescriptor {
        index: parse_field(fields, 0, line, "status channel index")?,
        id: fields[1].to_string(),
        phase: fields[2].to_string(),
        circuit: fields[3].to_string(),
        normal_state,
    })
}

fn parse_encoding(fields: &[&str], line: usize) -> Result<DataEncoding> {
    if fields[0].eq_ignore_ascii_case(BINARY_MARKER) {
        Ok(DataEncoding::Binary)
    } else {
        Err(ComtradeError::format(
            line,
            format!("unsupported data file type '{}', only BINARY is supported", fields[0]),
        ))
    }
}

fn parse_time_multiplier(fields: &[&str], line: usize) -> Result<f64> {
    if fields[0].is_empty() {
        return Ok(1.0);
    }
    parse_field(fields, 0, line, "time multiplier")
}

// ============================================================================
// Entry points
// ============================================================================

/// Parse configuration text into a record schema.
pub fn parse_config(text: &str) -> Result<RecordSchema> {
    let mut cfg = ConfigLines::new(text);

    // Data file type first: an unsupported encoding is rejected before
    // anything else is interpreted.
    let (ft_line, ft) = cfg.from_end(2, 1, "data file type")?;
    let encoding = parse_encoding(ft, ft_line)?;
    let (tm_line, tm) = cfg.from_end(1, 1, "time multiplier")?;
    let time_multiplier = parse_time_multiplier(tm, tm_line)?;

    // Station identity
    let (line, id) = cfg.next_row(2, "station identification")?;
    let station = id[0].to_string();
    let device = id[1].to_string();
    let revision = match id.get(2) {
        Some(rev) if !rev.is_empty() => Some(parse_field(id, 2, line, "revision year")?),
        _ => None,
    };

    // Channel counts
    let (line, counts) = cfg.next_row(3, "channel count")?;
    let total: usize = parse_field(counts, 0, line, "total channel count")?;
    let analog = parse_count(counts[1], 'A', line, "analog channel count")?;
    let status = parse_count(counts[2], 'D', line, "status channel count")?;
    if total != analog + status {
        return Err(ComtradeError::format(
            line,
            format!(
                "total channel count {} != {}A + {}D",
                total, analog, status
            ),
        ));
    }

    let mut channels = Vec::with_capacity(analog);
    for _ in 0..analog {
        let (line, row) = cfg.next_row(ANALOG_FIELDS, "analog channel")?;
        channels.push(parse_analog_row(row, line)?);
    }

    let mut status_channels = Vec::with_capacity(status);
    for _ in 0..status {
        let (line, row) = cfg.next_row(STATUS_FIELDS, "status channel")?;
        status_channels.push(parse_status_row(row, line)?);
    }

    let (line, lf) = cfg.next_row(1, "line frequency")?;
    let line_frequency: f64 = parse_field(lf, 0, line, "line frequency")?;

    let (line, nr) = cfg.next_row(1, "sample rate count")?;
    let nrates: usize = parse_field(nr, 0, line, "sample rate count")?;

    // nrates == 0 still carries one "0,endsamp" row
    let mut sample_rates = Vec::with_capacity(nrates.max(1));
    for _ in 0..nrates.max(1) {
        let (line, row) = cfg.next_row(2, "sample rate")?;
        sample_rates.push(SampleRate {
            rate_hz: parse_field(row, 0, line, "sample rate")?,
            end_sample: parse_field(row, 1, line, "end sample")?,
        });
    }

    if cfg.pos + TRAILER_AFTER_RATES != cfg.len() {
        return Err(ComtradeError::Format(format!(
            "sample rate table ends on line {}, expected line {} (5 lines before end of file)",
            cfg.pos,
            cfg.len().saturating_sub(TRAILER_AFTER_RATES)
        )));
    }

    // Only the final segment's end sample is honored. Frames number their
    // samples with a u32, so larger counts cannot describe a real data file.
    let sample_count = sample_rates.last().map(|r| r.end_sample).unwrap_or(0);
    if u32::try_from(sample_count).is_err() {
        return Err(ComtradeError::format(
            cfg.pos,
            format!("end sample {} exceeds the u32 sample numbering", sample_count),
        ));
    }

    let (_, st) = cfg.next_row(2, "start timestamp")?;
    let start = parse_timestamp(st[0], st[1])?;
    let (_, tr) = cfg.next_row(2, "trigger timestamp")?;
    let trigger = parse_timestamp(tr[0], tr[1])?;
    let interval = sample_interval(start, trigger, sample_count)?;

    let status_words = status.div_ceil(STATUS_BITS_PER_WORD);

    debug!(
        analog,
        status,
        status_words,
        samples = sample_count,
        rates = sample_rates.len(),
        "Configuration parsed"
    );

    Ok(RecordSchema {
        station,
        device,
        revision,
        channels,
        status_channels,
        status_words,
        line_frequency,
        sample_rates,
        sample_count,
        start,
        trigger,
        sample_interval: interval,
        encoding,
        time_multiplier,
    })
}

/// Read and parse a configuration file.
///
/// Non UTF-8 bytes in station or channel names are replaced rather than
/// rejected.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<RecordSchema> {
    let bytes = std::fs::read(path.as_ref())?;
    let text = String::from_utf8_lossy(&bytes);
    let schema = parse_config(&text)?;
    info!(
        station = %schema.station,
        device = %schema.device,
        channels = schema.analog_count(),
        samples = schema.sample_count,
        "Schema ready"
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const CFG: &str = "\
SUB01,REC-7,1999
3,2A,1D
1,IA,A,Feeder 1,A,0.01,0.5,0,-32767,32767,600,5,S
2,VA,A,Feeder 1,kV,0.002,0,0,-32767,32767,110,0.1,P
1,CB52,,Feeder 1,0
50
1
1000,4
06/01/2022,14:19:32.000000
06/01/2022,14:19:32.004000
BINARY
1
";

    fn assert_format_err(text: &str) {
        match parse_config(text) {
            Err(ComtradeError::Format(_)) => {}
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_complete_config() {
        let schema = parse_config(CFG).unwrap();

        assert_eq!(schema.station(), "SUB01");
        assert_eq!(schema.device(), "REC-7");
        assert_eq!(schema.revision(), Some(1999));
        assert_eq!(schema.analog_count(), 2);
        assert_eq!(schema.status_count(), 1);
        assert_eq!(schema.status_words(), 1);
        assert_eq!(schema.sample_count(), 4);
        assert_eq!(schema.line_frequency(), 50.0);
        assert_eq!(schema.encoding(), DataEncoding::Binary);
        assert_eq!(schema.time_multiplier(), 1.0);
        assert_eq!(schema.frame_len(), 14);
        assert_eq!(schema.sample_interval(), TimeDelta::microseconds(1000));

        let ia = &schema.channels()[0];
        assert_eq!(ia.index, 1);
        assert_eq!(ia.id, "IA");
        assert_eq!(ia.circuit, "Feeder 1");
        assert_eq!(ia.a, 0.01);
        assert_eq!(ia.b, 0.5);
        assert_eq!(ia.min, -32767);
        assert_eq!(ia.scaling, ScalingMode::Secondary);
        assert_eq!(schema.channel("VA").map(|c| c.unit.as_str()), Some("kV"));

        let cb = &schema.status_channels()[0];
        assert_eq!(cb.id, "CB52");
        assert!(!cb.normal_state);
    }

    #[test]
    fn test_status_word_count_rounds_up() {
        let mut text = String::from("S,D\n18,1A,17D\n");
        text.push_str("1,I,,,A,1,0,0,-1,1,1,1,P\n");
        for i in 1..=17 {
            text.push_str(&format!("{},D{},,,0\n", i, i));
        }
        text.push_str("60\n1\n0,10\n01/01/2020,00:00:00.0\n01/01/2020,00:00:01.0\nbinary\n1\n");
        let schema = parse_config(&text).unwrap();
        assert_eq!(schema.status_count(), 17);
        assert_eq!(schema.status_words(), 2);
        assert_eq!(schema.frame_len(), 8 + 2 + 4);
    }

    #[test]
    fn test_crlf_and_trailing_blank_lines() {
        let text = CFG.replace('\n', "\r\n") + "\r\n\r\n";
        let schema = parse_config(&text).unwrap();
        assert_eq!(schema.sample_count(), 4);
    }

    #[test]
    fn test_ascii_marker_rejected() {
        assert_format_err(&CFG.replace("BINARY", "ASCII"));
    }

    #[test]
    fn test_short_analog_row() {
        assert_format_err(&CFG.replace(",600,5,S", ",600,5"));
    }

    #[test]
    fn test_bad_counts() {
        assert_format_err(&CFG.replace("3,2A,1D", "3,xA,1D"));
        assert_format_err(&CFG.replace("3,2A,1D", "three,2A,1D"));
        assert_format_err(&CFG.replace("3,2A,1D", "4,2A,1D"));
        assert_format_err(&CFG.replace("3,2A,1D", "3,2,1"));
        assert_format_err(&CFG.replace("3,2A,1D", "3,2A,1"));
        assert_format_err(&CFG.replace("3,2A,1D", "3,2D,1A"));
        assert_format_err(&CFG.replace("\n1\n1000,4", "\nmany\n1000,4"));
    }

    #[test]
    fn test_bad_numeric_field() {
        assert_format_err(&CFG.replace("0.01,0.5", "abc,0.5"));
        assert_format_err(&CFG.replace(",600,5,S", ",600,5,Q"));
        assert_format_err(&CFG.replace("Feeder 1,0\n", "Feeder 1,2\n"));
    }

    #[test]
    fn test_misaligned_trailer() {
        // One extra line between the rate table and the timestamps
        assert_format_err(&CFG.replace("1000,4\n", "1000,4\n2000,8\n"));
        // Rate count larger than the table
        assert_format_err(&CFG.replace("\n1\n1000,4", "\n2\n1000,4"));
    }

    #[test]
    fn test_final_rate_segment_honored() {
        let text = CFG.replace("\n1\n1000,4\n", "\n2\n1000,4\n500,10\n");
        let schema = parse_config(&text).unwrap();
        assert_eq!(schema.sample_rates().len(), 2);
        assert_eq!(schema.sample_count(), 10);
    }

    #[test]
    fn test_sample_count_beyond_u32_rejected() {
        assert_format_err(&CFG.replace("1000,4\n", "1000,18446744073709551615\n"));
        assert_format_err(&CFG.replace("1000,4\n", "1000,4294967296\n"));

        let text = CFG.replace("1000,4\n", "1000,4294967295\n");
        let schema = parse_config(&text).unwrap();
        assert_eq!(schema.sample_count(), u32::MAX as usize);
        assert!(schema.sample_interval() >= TimeDelta::zero());
    }

    #[test]
    fn test_bad_timestamp_is_time_error() {
        let text = CFG.replace("06/01/2022,14:19:32.004000", "06/13/2022,14:19:32.004000");
        assert!(matches!(
            parse_config(&text),
            Err(ComtradeError::TimeFormat(_))
        ));
    }

    #[test]
    fn test_empty_time_multiplier_defaults() {
        let text = CFG.replace("BINARY\n1\n", "BINARY\n\n");
        // Trailing blank lines are trimmed, so an empty multiplier has to be
        // written as an empty field and a bare blank line shifts the trailer
        assert_format_err(&text);

        let text = CFG.replace("BINARY\n1\n", "BINARY\n,\n");
        let schema = parse_config(&text).unwrap();
        assert_eq!(schema.time_multiplier(), 1.0);
    }

    #[test]
    fn test_too_short() {
        assert_format_err("");
        assert_format_err("BINARY\n1\n");
    }
}
