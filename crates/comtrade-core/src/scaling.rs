//! Per-channel linear scaling
//!
//! `value = raw * a + b`. Declared min/max bounds are not enforced; recorders
//! write out-of-range samples and they are projected through the same formula.

use crate::types::{ChannelDescriptor, ScalingMode};

/// Scale a raw sample into the channel's engineering units.
#[inline]
pub fn primary_value(raw: i32, descriptor: &ChannelDescriptor) -> f64 {
    raw as f64 * descriptor.a + descriptor.b
}

/// Scale a whole raw sequence.
pub fn scale_all(raw: &[i16], descriptor: &ChannelDescriptor) -> Vec<f64> {
    raw.iter()
        .map(|&x| primary_value(x as i32, descriptor))
        .collect()
}

/// Value referred to the secondary side of the instrument transformer.
///
/// Channels flagged `S` already scale to secondary values. For `P` channels
/// the scaled value is divided by the transformer ratio.
pub fn secondary_value(raw: i32, descriptor: &ChannelDescriptor) -> f64 {
    let value = primary_value(raw, descriptor);
    match descriptor.scaling {
        ScalingMode::Secondary => value,
        ScalingMode::Primary => match ratio(descriptor) {
            Some(r) => value / r,
            None => value,
        },
    }
}

/// Value referred to the primary side of the instrument transformer.
pub fn primary_side_value(raw: i32, descriptor: &ChannelDescriptor) -> f64 {
    let value = primary_value(raw, descriptor);
    match descriptor.scaling {
        ScalingMode::Primary => value,
        ScalingMode::Secondary => match ratio(descriptor) {
            Some(r) => value * r,
            None => value,
        },
    }
}

/// Largest magnitude in a scaled sequence with its sample index.
///
/// Returns `(index, |value|)` of the first sample reaching the maximum, or
/// `None` for an empty sequence. NaN samples never win.
pub fn peak(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .map(|v| v.abs())
        .enumerate()
        .fold(None, |best, (i, mag)| match best {
            _ if mag.is_nan() => best,
            Some((_, top)) if mag <= top => best,
            _ => Some((i, mag)),
        })
}

/// primary / secondary, if both factors are non-zero
#[inline]
fn ratio(descriptor: &ChannelDescriptor) -> Option<f64> {
    (descriptor.primary != 0.0 && descriptor.secondary != 0.0)
        .then(|| descriptor.primary / descriptor.secondary)
}
