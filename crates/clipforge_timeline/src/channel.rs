// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe interpolation.
//!
//! A [`Channel`] holds the keys of one (clip, property) pair, already
//! resolved to a concrete value type, so evaluation never inspects the
//! shape of a value. Lookup is a binary search over offsets.

use crate::easing::Easing;
use crate::keyframe::CompoundValue;

/// Values that can be blended between two keyframes
pub trait Interpolate: Copy {
    /// Blend `a` towards `b` by `t`
    fn lerp(a: Self, b: Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn lerp(a: f64, b: f64, t: f64) -> f64 {
        a + (b - a) * t
    }
}

impl Interpolate for CompoundValue {
    fn lerp(a: CompoundValue, b: CompoundValue, t: f64) -> CompoundValue {
        CompoundValue {
            x: f64::lerp(a.x, b.x, t),
            y: f64::lerp(a.y, b.y, t),
        }
    }
}

/// A resolved control point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelKey<T> {
    /// Normalized offset in `[0,1]`
    pub offset: f64,
    /// Value at the offset
    pub value: T,
    /// Curve towards the next key
    pub easing: Easing,
}

/// Sorted keys for one animated property
#[derive(Debug, Clone, PartialEq)]
pub struct Channel<T> {
    keys: Vec<ChannelKey<T>>,
    default: T,
}

impl<T: Interpolate> Channel<T> {
    /// Create a channel from keys already sorted by offset
    pub fn new(keys: Vec<ChannelKey<T>>, default: T) -> Self {
        debug_assert!(keys.windows(2).all(|w| w[0].offset < w[1].offset));
        Self { keys, default }
    }

    /// Channel with no keys; always evaluates to `default`
    pub fn constant(default: T) -> Self {
        Self {
            keys: Vec::new(),
            default,
        }
    }

    /// Evaluate the property at a normalized offset
    pub fn evaluate(&self, offset: f64) -> T {
        evaluate(&self.keys, offset, self.default)
    }

    /// Whether any keys are set
    pub fn is_animated(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Get all keys
    pub fn keys(&self) -> &[ChannelKey<T>] {
        &self.keys
    }
}

/// Evaluate sorted keys at `offset`, returning `default` when empty
pub fn evaluate<T: Interpolate>(keys: &[ChannelKey<T>], offset: f64, default: T) -> T {
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return default;
    };

    if offset.is_nan() || offset <= first.offset {
        return first.value;
    }
    if offset >= last.offset {
        return last.value;
    }

    // First key strictly after `offset`; always in 1..len here.
    let next = keys.partition_point(|k| k.offset <= offset);
    let a = &keys[next - 1];
    let b = &keys[next];

    if a.offset == offset {
        return a.value;
    }

    let t = (offset - a.offset) / (b.offset - a.offset);
    T::lerp(a.value, b.value, a.easing.apply(t))
}
