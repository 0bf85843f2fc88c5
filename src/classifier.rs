//! Turns a [`Matching`] into one outcome per prediction plus the error list.

use crate::config::TideConfig;
use crate::diagnosis::{BestGtMatch, DetectionError, ErrorKind};
use crate::matching::{GtFilter, Matching};
use serde::Serialize;

/// Final outcome of one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    TruePositive { gt: usize },
    /// Absorbed by an ignore region; neither scored nor penalized.
    Ignored { gt: usize },
    Error { kind: ErrorKind },
}

impl Outcome {
    pub fn is_true_positive(&self) -> bool {
        matches!(self, Outcome::TruePositive { .. })
    }
}

/// Classifier output: `outcomes[pred]` for every prediction, and the errors.
///
/// Prediction errors come first in prediction id order, then misses in
/// ground truth id order.
#[derive(Debug, Clone)]
pub struct Classification {
    pub outcomes: Vec<Outcome>,
    pub errors: Vec<DetectionError>,
}

/// Classify every prediction and every unclaimed ground truth exactly once.
pub fn classify(
    matching: &Matching,
    pred_classes: &[u64],
    gt_classes: &[u64],
    gt_ignore: &[bool],
    config: &TideConfig,
) -> Classification {
    let mut outcomes = Vec::with_capacity(pred_classes.len());
    let mut errors = Vec::new();

    for (pred, &pred_class) in pred_classes.iter().enumerate() {
        if let Some(gt) = matching.true_positive(pred) {
            outcomes.push(Outcome::TruePositive { gt });
            continue;
        }
        if let Some(gt) = matching.ignored_by(pred) {
            outcomes.push(Outcome::Ignored { gt });
            continue;
        }

        let error = classify_prediction(matching, pred, pred_class, gt_classes, config);
        outcomes.push(Outcome::Error { kind: error.kind() });
        errors.push(error);
    }

    for (gt, (&class, &ignore)) in gt_classes.iter().zip(gt_ignore).enumerate() {
        if !ignore && matching.claimant(gt).is_none() {
            errors.push(DetectionError::Missed { gt, gt_class: class });
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        for kind in ErrorKind::MAIN {
            let count = errors.iter().filter(|e| e.kind() == kind).count();
            log::debug!("{} errors: {}", kind.short_name(), count);
        }
    }

    Classification { outcomes, errors }
}

fn classify_prediction(
    matching: &Matching,
    pred: usize,
    pred_class: u64,
    gt_classes: &[u64],
    config: &TideConfig,
) -> DetectionError {
    let pos = config.pos_threshold;
    let bg = config.background_threshold;

    let same = matching.best_gt(pred, GtFilter::SameClass);
    let other = matching.best_gt(pred, GtFilter::OtherClass);
    let same_iou = same.map_or(0.0, |b| b.iou);
    let other_iou = other.map_or(0.0, |b| b.iou);

    // Correct class and location, but the ground truth was already claimed
    if let Some(best) = same.filter(|b| b.iou >= pos) {
        if let Some(suppressor) = matching.claimant(best.gt) {
            return DetectionError::Duplicate {
                pred,
                gt: best.gt,
                suppressor,
            };
        }
    }

    if let Some(best) = same.filter(|b| b.iou >= bg) {
        return DetectionError::Box {
            pred,
            gt: best.gt,
            pred_class,
            best_match: unclaimed(matching, pred, best.gt),
        };
    }

    if let Some(best) = other.filter(|b| b.iou >= pos) {
        return DetectionError::Class {
            pred,
            gt: best.gt,
            gt_class: gt_classes[best.gt],
            best_match: unclaimed(matching, pred, best.gt),
        };
    }

    if let Some(best) = other.filter(|b| b.iou >= bg) {
        return DetectionError::ClassBox { pred, gt: best.gt };
    }

    log::trace!(
        "prediction {} is background (same-class iou {:.3}, other-class iou {:.3})",
        pred,
        same_iou,
        other_iou
    );
    DetectionError::Background { pred }
}

fn unclaimed(matching: &Matching, pred: usize, gt: usize) -> Option<BestGtMatch> {
    match matching.claimant(gt) {
        Some(_) => None,
        None => Some(BestGtMatch { pred, gt }),
    }
}
