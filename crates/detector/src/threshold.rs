use crate::errors::DetectionError;
use serde::Serialize;
use std::fmt;

/// Confidence cutoff guaranteed to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Threshold(f32);

impl Threshold {
    pub const DEFAULT: Threshold = Threshold(0.4);

    pub fn new(value: f32) -> Result<Self, DetectionError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DetectionError::InvalidInput(format!(
                "threshold {} is outside [0, 1]",
                value
            )))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Effective threshold for one call: the requested value when given,
    /// otherwise the process default. Out-of-range requests are rejected,
    /// never clamped.
    pub fn resolve(requested: Option<f32>, default: Threshold) -> Result<Self, DetectionError> {
        match requested {
            Some(value) => Self::new(value),
            None => Ok(default),
        }
    }

    pub fn admits(self, score: f32) -> bool {
        score >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
