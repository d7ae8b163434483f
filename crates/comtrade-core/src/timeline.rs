//! Absolute per-sample timestamps
//!
//! A record only carries its start and trigger instants. Sample `i` is placed
//! at `start + i * ((trigger - start) / sample_count)`, where the divisor is
//! the sample count declared by the configuration file.

use crate::types::{ComtradeError, RecordSchema, Result, TIMESTAMP_FORMAT};
use chrono::{NaiveDateTime, TimeDelta};

/// Parse a configuration timestamp given as separate date and time fields
/// (`DD/MM/YYYY`, `HH:MM:SS.ffffff`).
pub fn parse_timestamp(date: &str, time: &str) -> Result<NaiveDateTime> {
    let text = format!("{} {}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT)
        .map_err(|e| ComtradeError::TimeFormat(format!("'{}': {}", text, e)))
}

/// Interval between consecutive samples, truncated to whole nanoseconds.
///
/// Fails when the trigger precedes the start, since the resulting sequence
/// would run backwards.
pub fn sample_interval(
    start: NaiveDateTime,
    trigger: NaiveDateTime,
    sample_count: usize,
) -> Result<TimeDelta> {
    if trigger < start {
        return Err(ComtradeError::TimeFormat(format!(
            "trigger {} precedes start {}",
            trigger, start
        )));
    }
    if sample_count == 0 {
        return Ok(TimeDelta::zero());
    }
    let span_ns = (trigger - start).num_nanoseconds().ok_or_else(|| {
        ComtradeError::TimeFormat(format!("span {} .. {} is out of range", start, trigger))
    })?;
    let divisor = i64::try_from(sample_count).map_err(|_| {
        ComtradeError::TimeFormat(format!("sample count {} is out of range", sample_count))
    })?;
    Ok(TimeDelta::nanoseconds(span_ns / divisor))
}

/// Lazy sequence of absolute sample timestamps
#[derive(Debug, Clone)]
pub struct Timeline {
    start: NaiveDateTime,
    interval_ns: i64,
    len: usize,
    pos: usize,
}

impl Timeline {
    pub fn new(start: NaiveDateTime, interval: TimeDelta, len: usize) -> Self {
        Self {
            start,
            interval_ns: interval.num_nanoseconds().unwrap_or(0),
            len,
            pos: 0,
        }
    }

    pub fn from_schema(schema: &RecordSchema) -> Self {
        Self::new(
            schema.start(),
            schema.sample_interval(),
            schema.sample_count(),
        )
    }

    /// Timestamp of sample `index`, or `None` past the end of the record
    pub fn timestamp(&self, index: usize) -> Option<NaiveDateTime> {
        (index < self.len).then(|| self.start + self.offset(index))
    }

    /// Offset of sample `index` from the start instant
    #[inline]
    pub fn offset(&self, index: usize) -> TimeDelta {
        TimeDelta::nanoseconds(self.interval_ns.saturating_mul(index as i64))
    }

    /// Offsets from the start instant in microseconds, one per sample
    pub fn offsets_micros(&self) -> Vec<f64> {
        (0..self.len)
            .map(|i| self.interval_ns as f64 * i as f64 / 1_000.0)
            .collect()
    }
}

impl Iterator for Timeline {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        let ts = self.timestamp(self.pos)?;
        self.pos += 1;
        Some(ts)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len.saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Timeline {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(date: &str, time: &str) -> NaiveDateTime {
        parse_timestamp(date, time).unwrap()
    }

    #[test]
    fn test_parse_timestamp_microseconds() {
        let t = ts("06/01/2022", "14:19:32.461840");
        assert_eq!(t.to_string(), "2022-01-06 14:19:32.461840");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("2022-01-06", "14:19:32.461840"),
            Err(ComtradeError::TimeFormat(_))
        ));
        assert!(matches!(
            parse_timestamp("06/01/2022", "not a time"),
            Err(ComtradeError::TimeFormat(_))
        ));
        assert!(matches!(
            parse_timestamp("31/02/2022", "00:00:00.000000"),
            Err(ComtradeError::TimeFormat(_))
        ));
    }

    #[test]
    fn test_interval_uses_sample_count() {
        let start = ts("06/01/2022", "14:19:32.000000");
        let trigger = ts("06/01/2022", "14:19:32.100000");

        let interval = sample_interval(start, trigger, 4).unwrap();
        assert_eq!(interval, TimeDelta::microseconds(25_000));

        let interval = sample_interval(start, trigger, 1600).unwrap();
        assert_eq!(interval, TimeDelta::microseconds(62) + TimeDelta::nanoseconds(500));
    }

    #[test]
    fn test_interval_trigger_before_start() {
        let start = ts("06/01/2022", "14:19:32.100000");
        let trigger = ts("06/01/2022", "14:19:32.000000");
        assert!(matches!(
            sample_interval(start, trigger, 4),
            Err(ComtradeError::TimeFormat(_))
        ));
    }

    #[test]
    fn test_interval_huge_sample_count() {
        let start = ts("01/01/2023", "00:00:00.000000");
        let trigger = ts("01/01/2023", "00:00:01.000000");
        assert!(matches!(
            sample_interval(start, trigger, usize::MAX),
            Err(ComtradeError::TimeFormat(_))
        ));
        let interval = sample_interval(start, trigger, i64::MAX as usize).unwrap();
        assert_eq!(interval, TimeDelta::zero());
    }

    #[test]
    fn test_interval_zero_samples() {
        let start = ts("06/01/2022", "14:19:32.000000");
        let trigger = ts("06/01/2022", "14:19:33.000000");
        assert_eq!(sample_interval(start, trigger, 0).unwrap(), TimeDelta::zero());
        let timeline = Timeline::new(start, TimeDelta::zero(), 0);
        assert_eq!(timeline.count(), 0);
    }

    #[test]
    fn test_timeline_endpoints_and_order() {
        let start = ts("06/01/2022", "14:19:32.000000");
        let trigger = ts("06/01/2022", "14:19:32.100000");
        let n = 8;
        let interval = sample_interval(start, trigger, n).unwrap();
        let timeline = Timeline::new(start, interval, n);

        assert_eq!(timeline.len(), n);
        assert_eq!(timeline.timestamp(0), Some(start));
        assert_eq!(
            timeline.timestamp(n - 1),
            Some(start + (trigger - start) * (n as i32 - 1) / n as i32)
        );
        assert_eq!(timeline.timestamp(n), None);

        let stamps: Vec<_> = timeline.collect();
        assert_eq!(stamps.len(), n);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_offsets_micros() {
        let start = ts("01/01/2023", "00:00:00.000000");
        let timeline = Timeline::new(start, TimeDelta::microseconds(250), 4);
        assert_eq!(timeline.offsets_micros(), vec![0.0, 250.0, 500.0, 750.0]);
    }
}
