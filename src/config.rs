//! Matching thresholds.

use crate::error::{Result, TideError};
use serde::{Deserialize, Serialize};

/// Default IoU for a prediction to count as a true positive (mAP@50).
pub const DEFAULT_POS_THRESHOLD: f64 = 0.5;

/// Default IoU below which a prediction is considered pure background.
pub const DEFAULT_BACKGROUND_THRESHOLD: f64 = 0.1;

/// Overlap thresholds shared by the matcher and the error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TideConfig {
    pub pos_threshold: f64,
    pub background_threshold: f64,
}

impl Default for TideConfig {
    fn default() -> Self {
        Self {
            pos_threshold: DEFAULT_POS_THRESHOLD,
            background_threshold: DEFAULT_BACKGROUND_THRESHOLD,
        }
    }
}

impl TideConfig {
    /// Config with a custom positive threshold and the default background threshold.
    pub fn with_pos_threshold(pos_threshold: f64) -> Self {
        Self {
            pos_threshold,
            ..Self::default()
        }
    }

    /// Both thresholds must lie in `[0, 1]`, background not above positive.
    pub fn validate(&self) -> Result<()> {
        validate_threshold("pos_threshold", self.pos_threshold)?;
        validate_threshold("background_threshold", self.background_threshold)?;
        if self.background_threshold > self.pos_threshold {
            return Err(TideError::InvalidThreshold(format!(
                "background_threshold {} exceeds pos_threshold {}",
                self.background_threshold, self.pos_threshold
            )));
        }
        Ok(())
    }
}

fn validate_threshold(name: &str, threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(TideError::InvalidThreshold(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, threshold
        )));
    }
    Ok(())
}
