//! The detection error taxonomy.
//!
//! Every prediction that is not a true positive ends up as exactly one
//! [`DetectionError`], and every unclaimed ground truth becomes a
//! [`DetectionError::Missed`]. Two extra variants, `FalsePositive` and
//! `FalseNegative`, never come out of matching: they exist so the AP engine can
//! ask "what if every false positive / false negative were gone".

use serde::{Deserialize, Serialize};

/// Discriminant of a [`DetectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    Class,
    Box,
    ClassBox,
    Duplicate,
    Background,
    Missed,
    FalsePositive,
    FalseNegative,
}

impl ErrorKind {
    /// Kinds produced by the classifier.
    pub const MAIN: [ErrorKind; 6] = [
        ErrorKind::Class,
        ErrorKind::Box,
        ErrorKind::ClassBox,
        ErrorKind::Duplicate,
        ErrorKind::Background,
        ErrorKind::Missed,
    ];

    /// Metric accounting kinds.
    pub const SPECIAL: [ErrorKind; 2] = [ErrorKind::FalsePositive, ErrorKind::FalseNegative];

    pub fn short_name(&self) -> &'static str {
        match self {
            ErrorKind::Class => "Cls",
            ErrorKind::Box => "Loc",
            ErrorKind::ClassBox => "Both",
            ErrorKind::Duplicate => "Dupe",
            ErrorKind::Background => "Bkg",
            ErrorKind::Missed => "Miss",
            ErrorKind::FalsePositive => "FalsePos",
            ErrorKind::FalseNegative => "FalseNeg",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Class => {
                "Error caused when a prediction would have been marked positive \
                 if it had the correct class."
            }
            ErrorKind::Box => {
                "Error caused when a prediction would have been marked positive \
                 if it was localized better."
            }
            ErrorKind::ClassBox => {
                "Error caused when a prediction would have been marked positive \
                 if it had the correct class and was localized better."
            }
            ErrorKind::Duplicate => {
                "Error caused when a prediction would have been marked positive \
                 if the GT wasn't already in use by another detection."
            }
            ErrorKind::Background => {
                "Error caused when this detection should have been classified as \
                 background (IoU below the background threshold)."
            }
            ErrorKind::Missed => {
                "Represents GT missed by the model. Doesn't include GT corrected \
                 elsewhere in the model."
            }
            ErrorKind::FalsePositive => {
                "Represents the potential AP gained by having perfect precision \
                 (e.g., by scoring all false positives as conf=0) without affecting recall."
            }
            ErrorKind::FalseNegative => {
                "Represents the potential AP gained by having perfect recall \
                 without affecting precision."
            }
        }
    }
}

/// A prediction paired with an unclaimed ground truth it could be turned into
/// a true positive for.
///
/// Only exists while the ground truth has no true-positive claimant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestGtMatch {
    pub pred: usize,
    pub gt: usize,
}

impl BestGtMatch {
    /// The ground truth the prediction would claim once corrected.
    pub fn fix(&self) -> usize {
        self.gt
    }
}

/// Counterfactual correction of one error, consumed by the AP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fix {
    /// The prediction becomes a true positive of `class_id` claiming `gt`.
    Rescore { class_id: u64, gt: usize },
    /// One ground truth of `class_id` stops counting as a positive.
    DropPositive { class_id: u64 },
    /// Every non-true-positive data point is removed.
    SuppressFalsePositives,
    /// Positives shrink to the number of true positives.
    RecoverFalseNegatives,
}

/// One diagnosed error. Annotations are referenced by their dataset id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionError {
    Class {
        pred: usize,
        gt: usize,
        gt_class: u64,
        best_match: Option<BestGtMatch>,
    },
    Box {
        pred: usize,
        gt: usize,
        pred_class: u64,
        best_match: Option<BestGtMatch>,
    },
    ClassBox {
        pred: usize,
        gt: usize,
    },
    Duplicate {
        pred: usize,
        gt: usize,
        suppressor: usize,
    },
    Background {
        pred: usize,
    },
    Missed {
        gt: usize,
        gt_class: u64,
    },
    FalsePositive,
    FalseNegative,
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectionError::Class { .. } => ErrorKind::Class,
            DetectionError::Box { .. } => ErrorKind::Box,
            DetectionError::ClassBox { .. } => ErrorKind::ClassBox,
            DetectionError::Duplicate { .. } => ErrorKind::Duplicate,
            DetectionError::Background { .. } => ErrorKind::Background,
            DetectionError::Missed { .. } => ErrorKind::Missed,
            DetectionError::FalsePositive => ErrorKind::FalsePositive,
            DetectionError::FalseNegative => ErrorKind::FalseNegative,
        }
    }

    /// Short code, e.g. `"Dupe"`.
    pub fn code(&self) -> &'static str {
        self.kind().short_name()
    }

    pub fn description(&self) -> &'static str {
        self.kind().description()
    }

    /// The offending prediction, if any.
    pub fn pred(&self) -> Option<usize> {
        match *self {
            DetectionError::Class { pred, .. }
            | DetectionError::Box { pred, .. }
            | DetectionError::ClassBox { pred, .. }
            | DetectionError::Duplicate { pred, .. }
            | DetectionError::Background { pred } => Some(pred),
            _ => None,
        }
    }

    /// The ground truth this error refers to, if any.
    pub fn gt(&self) -> Option<usize> {
        match *self {
            DetectionError::Class { gt, .. }
            | DetectionError::Box { gt, .. }
            | DetectionError::ClassBox { gt, .. }
            | DetectionError::Duplicate { gt, .. }
            | DetectionError::Missed { gt, .. } => Some(gt),
            _ => None,
        }
    }

    /// `(pred, gt)` when the error ties a prediction to a ground truth.
    pub fn link(&self) -> Option<(usize, usize)> {
        self.pred().zip(self.gt())
    }

    /// What changes if this error alone is corrected.
    ///
    /// `None` means the prediction can only be suppressed.
    pub fn fix(&self) -> Option<Fix> {
        match self {
            DetectionError::Class {
                gt_class,
                best_match,
                ..
            } => best_match.map(|m| Fix::Rescore {
                class_id: *gt_class,
                gt: m.fix(),
            }),
            DetectionError::Box {
                pred_class,
                best_match,
                ..
            } => best_match.map(|m| Fix::Rescore {
                class_id: *pred_class,
                gt: m.fix(),
            }),
            DetectionError::ClassBox { .. }
            | DetectionError::Duplicate { .. }
            | DetectionError::Background { .. } => None,
            DetectionError::Missed { gt_class, .. } => Some(Fix::DropPositive {
                class_id: *gt_class,
            }),
            DetectionError::FalsePositive => Some(Fix::SuppressFalsePositives),
            DetectionError::FalseNegative => Some(Fix::RecoverFalseNegatives),
        }
    }
}
