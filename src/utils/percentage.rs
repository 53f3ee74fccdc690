use std::{fmt::Display, ops::Deref};

use serde::{Deserialize, Serialize};

/// A share of a whole in `[0, 100]`. Every ratio in a report goes through [Percentage::ratio] so
/// that empty denominators read as 0 and nothing ever turns into `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.);

    /// `part / whole * 100` clamped into `[0, 100]`. A zero or non finite whole gives 0.
    pub fn ratio(part: f64, whole: f64) -> Percentage {
        if whole <= 0. || !whole.is_finite() || !part.is_finite() {
            return Self::ZERO;
        }
        // Adding zero turns the `-0.0` of an empty sum into `0.0`.
        Percentage((part / whole * 100.).clamp(0., 100.) + 0.)
    }

    /// Same as [Percentage::ratio] without the upper clamp. Schedule compliance can exceed 100%
    /// when people work more than expected.
    pub fn unbounded_ratio(part: f64, whole: f64) -> Percentage {
        if whole <= 0. || !whole.is_finite() || !part.is_finite() {
            return Self::ZERO;
        }
        Percentage((part / whole * 100.).max(0.) + 0.)
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
