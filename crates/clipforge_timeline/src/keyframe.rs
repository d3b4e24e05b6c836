// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe definitions for clip property animation.

use crate::easing::Easing;
use crate::error::{Result, TimelineError};
use crate::track::ClipId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyframeId(pub Uuid);

impl KeyframeId {
    /// Create a new random keyframe ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyframeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-component value used by 2-D properties
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompoundValue {
    /// Horizontal component
    pub x: f64,
    /// Vertical component
    pub y: f64,
}

impl CompoundValue {
    /// Create a compound value
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Same value on both axes
    pub const fn splat(v: f64) -> Self {
        Self { x: v, y: v }
    }
}

/// Shape of the values a property animates through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Single number
    Scalar,
    /// `{x, y}` pair
    Compound,
}

/// Properties a clip can animate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnimatableProperty {
    /// Canvas position offset
    Position,
    /// Uniform scale factor
    Scale,
    /// Non-uniform scale
    ScaleXY,
    /// Rotation in degrees
    Rotation,
    /// Opacity in `[0,1]`
    Opacity,
    /// Audio gain
    Volume,
}

impl AnimatableProperty {
    /// Every animatable property
    pub const ALL: [AnimatableProperty; 6] = [
        Self::Position,
        Self::Scale,
        Self::ScaleXY,
        Self::Rotation,
        Self::Opacity,
        Self::Volume,
    ];

    /// The value shape this property is declared with
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Position | Self::ScaleXY => ValueKind::Compound,
            Self::Scale | Self::Rotation | Self::Opacity | Self::Volume => ValueKind::Scalar,
        }
    }

    /// Value used when the property has no keyframes
    pub fn default_value(&self) -> KeyframeValue {
        match self {
            Self::Position => KeyframeValue::Compound(CompoundValue::splat(0.0)),
            Self::ScaleXY => KeyframeValue::Compound(CompoundValue::splat(1.0)),
            Self::Scale | Self::Opacity | Self::Volume => KeyframeValue::Scalar(1.0),
            Self::Rotation => KeyframeValue::Scalar(0.0),
        }
    }

    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Position => "Position",
            Self::Scale => "Scale",
            Self::ScaleXY => "Scale XY",
            Self::Rotation => "Rotation",
            Self::Opacity => "Opacity",
            Self::Volume => "Volume",
        }
    }
}

/// Value stored in a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KeyframeValue {
    /// Single number
    Scalar(f64),
    /// 2D value
    Compound(CompoundValue),
}

impl KeyframeValue {
    /// Shape of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Compound(_) => ValueKind::Compound,
        }
    }

    /// Get as scalar if possible
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Compound(_) => None,
        }
    }

    /// Get as compound if possible
    pub fn as_compound(&self) -> Option<CompoundValue> {
        match self {
            Self::Compound(v) => Some(*v),
            Self::Scalar(_) => None,
        }
    }
}

impl From<f64> for KeyframeValue {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<CompoundValue> for KeyframeValue {
    fn from(v: CompoundValue) -> Self {
        Self::Compound(v)
    }
}

/// A control point of an animated property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Unique keyframe ID
    pub id: KeyframeId,
    /// Position within the clip, normalized to `[0,1]`
    pub offset: f64,
    /// Value at this keyframe
    pub value: KeyframeValue,
    /// Curve used towards the next keyframe
    pub easing: Easing,
}

impl Keyframe {
    /// Create a new keyframe
    pub fn new(offset: f64, value: impl Into<KeyframeValue>) -> Self {
        Self {
            id: KeyframeId::new(),
            offset,
            value: value.into(),
            easing: Easing::Linear,
        }
    }

    /// Set the easing curve
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

/// Check a keyframe list for one (clip, property) pair.
///
/// Offsets must lie in `[0,1]` and be strictly ascending, values must match
/// the property's declared shape, and bezier easings must be well formed.
/// Lists are never reordered.
pub fn validate_keyframes(
    clip: ClipId,
    property: AnimatableProperty,
    keyframes: &[Keyframe],
) -> Result<()> {
    let reject = |reason: String| TimelineError::InvalidKeyframeData {
        clip,
        property,
        reason,
    };

    let mut previous: Option<f64> = None;
    for kf in keyframes {
        if !kf.offset.is_finite() || !(0.0..=1.0).contains(&kf.offset) {
            return Err(reject(format!("offset {} outside [0,1]", kf.offset)));
        }
        if let Some(prev) = previous {
            if kf.offset == prev {
                return Err(reject(format!("duplicate offset {}", kf.offset)));
            }
            if kf.offset < prev {
                return Err(reject(format!(
                    "offset {} follows {}; keyframes must be ascending",
                    kf.offset, prev
                )));
            }
        }
        if kf.value.kind() != property.kind() {
            return Err(reject(format!(
                "{:?} value on a {:?} property",
                kf.value.kind(),
                property.kind()
            )));
        }
        let finite = match kf.value {
            KeyframeValue::Scalar(v) => v.is_finite(),
            KeyframeValue::Compound(v) => v.x.is_finite() && v.y.is_finite(),
        };
        if !finite {
            return Err(reject("non-finite value".to_string()));
        }
        if !kf.easing.is_well_formed() {
            return Err(reject("malformed cubic-bezier control points".to_string()));
        }
        previous = Some(kf.offset);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_kinds() {
        assert_eq!(AnimatableProperty::Position.kind(), ValueKind::Compound);
        assert_eq!(AnimatableProperty::Scale.kind(), ValueKind::Scalar);
        for property in AnimatableProperty::ALL {
            assert_eq!(property.default_value().kind(), property.kind());
        }
    }

    #[test]
    fn test_validate_accepts_sorted() {
        let keys = vec![
            Keyframe::new(0.0, 1.0),
            Keyframe::new(0.5, 3.0).with_easing(Easing::EaseIn),
            Keyframe::new(1.0, 2.0),
        ];
        assert!(validate_keyframes(ClipId::new(), AnimatableProperty::Opacity, &keys).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let keys = vec![Keyframe::new(0.5, 1.0), Keyframe::new(0.5, 2.0)];
        let err = validate_keyframes(ClipId::new(), AnimatableProperty::Opacity, &keys);
        assert!(matches!(err, Err(TimelineError::InvalidKeyframeData { .. })));
    }

    #[test]
    fn test_validate_rejects_unsorted_and_out_of_range() {
        let clip = ClipId::new();
        let unsorted = vec![Keyframe::new(0.7, 1.0), Keyframe::new(0.2, 2.0)];
        assert!(validate_keyframes(clip, AnimatableProperty::Rotation, &unsorted).is_err());

        let out_of_range = vec![Keyframe::new(1.2, 1.0)];
        assert!(validate_keyframes(clip, AnimatableProperty::Rotation, &out_of_range).is_err());

        let negative = vec![Keyframe::new(-0.1, 1.0)];
        assert!(validate_keyframes(clip, AnimatableProperty::Rotation, &negative).is_err());
    }

    #[test]
    fn test_validate_rejects_mixed_shapes() {
        let keys = vec![
            Keyframe::new(0.0, CompoundValue::new(0.0, 0.0)),
            Keyframe::new(1.0, 4.0),
        ];
        assert!(validate_keyframes(ClipId::new(), AnimatableProperty::Position, &keys).is_err());
    }
}
