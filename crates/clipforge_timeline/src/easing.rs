// SPDX-License-Identifier: MIT OR Apache-2.0
//! Easing curves applied between keyframes.
//!
//! Every curve is a pure function `[0,1] -> [0,1]` pinned at both ends.
//! The bezier solver runs a fixed number of iterations so the same input
//! always yields the same bits.

use serde::{Deserialize, Serialize};

/// Newton-Raphson steps for the bezier x solve
const NEWTON_ITERATIONS: usize = 8;

/// Bisection steps when Newton fails to converge
const BISECTION_ITERATIONS: usize = 40;

/// Acceptable error in the x solve
const SOLVE_EPSILON: f64 = 1e-9;

/// Easing curve applied from a keyframe to the next one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Easing {
    /// Straight interpolation
    #[default]
    Linear,
    /// Quadratic ease in (`t * t`)
    EaseIn,
    /// Quadratic ease out
    EaseOut,
    /// Quadratic ease in, then out
    EaseInOut,
    /// Hold the left value until the next keyframe
    Step,
    /// CSS-style cubic bezier with control points `(x1, y1)` and `(x2, y2)`
    CubicBezier {
        /// First control point x, in `[0,1]`
        x1: f64,
        /// First control point y
        y1: f64,
        /// Second control point x, in `[0,1]`
        x2: f64,
        /// Second control point y
        y2: f64,
    },
}

impl Easing {
    /// Map a normalized time through the curve
    pub fn apply(self, t: f64) -> f64 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv
            }
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    let inv = -2.0 * t + 2.0;
                    1.0 - inv * inv / 2.0
                }
            }
            Self::Step => {
                if t >= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::CubicBezier { x1, y1, x2, y2 } => cubic_bezier(t, x1, y1, x2, y2),
        }
    }

    /// Check that bezier control points describe a function of time
    pub fn is_well_formed(&self) -> bool {
        match *self {
            Self::CubicBezier { x1, y1, x2, y2 } => {
                [x1, y1, x2, y2].iter().all(|v| v.is_finite())
                    && (0.0..=1.0).contains(&x1)
                    && (0.0..=1.0).contains(&x2)
            }
            _ => true,
        }
    }

    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EaseIn => "ease-in",
            Self::EaseOut => "ease-out",
            Self::EaseInOut => "ease-in-out",
            Self::Step => "step",
            Self::CubicBezier { .. } => "cubic-bezier",
        }
    }
}

fn sample(a1: f64, a2: f64, t: f64) -> f64 {
    let omt = 1.0 - t;
    3.0 * omt * omt * t * a1 + 3.0 * omt * t * t * a2 + t * t * t
}

fn sample_derivative(a1: f64, a2: f64, t: f64) -> f64 {
    let omt = 1.0 - t;
    3.0 * omt * omt * a1 + 6.0 * omt * t * (a2 - a1) + 3.0 * t * t * (1.0 - a2)
}

/// Solve `bx(u) = x` for `u`, then return `by(u)`
fn cubic_bezier(x: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let mut u = x;
    for _ in 0..NEWTON_ITERATIONS {
        let err = sample(x1, x2, u) - x;
        if err.abs() < SOLVE_EPSILON {
            return sample(y1, y2, u);
        }
        let d = sample_derivative(x1, x2, u);
        if d.abs() < 1e-7 {
            break;
        }
        u = (u - err / d).clamp(0.0, 1.0);
    }

    // Newton stalled; bisect from scratch.
    let mut lo = 0.0;
    let mut hi = 1.0;
    u = x;
    for _ in 0..BISECTION_ITERATIONS {
        let v = sample(x1, x2, u);
        if (v - x).abs() < SOLVE_EPSILON {
            break;
        }
        if v < x {
            lo = u;
        } else {
            hi = u;
        }
        u = 0.5 * (lo + hi);
    }

    sample(y1, y2, u)
}
