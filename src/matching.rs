//! Greedy per-image, per-class matching of predictions to ground truth.

use crate::config::TideConfig;
use crate::error::{Result, TideError};
use crate::types::Dataset;
use std::collections::{BTreeMap, BTreeSet};

/// Which ground truths a best-overlap query may consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtFilter {
    SameClass,
    OtherClass,
    AnyClass,
}

/// The highest-overlap ground truth found by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestOverlap {
    pub gt: usize,
    pub iou: f64,
}

/// Pairwise IoU between the predictions and ground truths of one image.
#[derive(Debug, Clone)]
pub struct OverlapTable {
    pred_ids: Vec<usize>,
    gt_ids: Vec<usize>,
    ious: Vec<f64>,
}

impl OverlapTable {
    /// Compute every prediction/ground truth overlap of one image.
    pub fn build(
        gts: &Dataset,
        preds: &Dataset,
        gt_ids: &[usize],
        pred_ids: &[usize],
    ) -> Result<Self> {
        let mut gt_ids = gt_ids.to_vec();
        gt_ids.sort_unstable();
        let mut pred_ids = pred_ids.to_vec();
        pred_ids.sort_unstable();

        let mut ious = Vec::with_capacity(pred_ids.len() * gt_ids.len());
        for &pred_id in &pred_ids {
            let pred = &preds.annotations()[pred_id];
            for &gt_id in &gt_ids {
                let gt = &gts.annotations()[gt_id];
                let iou = pred.region.iou(&gt.region).map_err(|err| {
                    TideError::RegionMismatch(format!(
                        "prediction {} vs ground truth {}: {}",
                        pred_id, gt_id, err
                    ))
                })?;
                ious.push(iou);
            }
        }

        Ok(Self {
            pred_ids,
            gt_ids,
            ious,
        })
    }

    /// Ground truth ids of this image, ascending.
    pub fn gt_ids(&self) -> &[usize] {
        &self.gt_ids
    }

    /// Overlaps of one prediction with every ground truth in [`Self::gt_ids`] order.
    pub fn row(&self, pred_id: usize) -> Option<&[f64]> {
        let row = self.pred_ids.binary_search(&pred_id).ok()?;
        let width = self.gt_ids.len();
        Some(&self.ious[row * width..(row + 1) * width])
    }
}

/// Result of the greedy matching pass over a whole dataset.
///
/// Holds the transient `used` state (which prediction claimed each ground
/// truth) and the overlap tables, so best-match queries never re-run matching.
#[derive(Debug, Clone)]
pub struct Matching {
    tables: BTreeMap<u64, OverlapTable>,
    pred_image: Vec<u64>,
    pred_class: Vec<u64>,
    gt_class: Vec<u64>,
    gt_ignore: Vec<bool>,
    claimed_by: Vec<Option<usize>>,
    true_positive: Vec<Option<usize>>,
    ignored_by: Vec<Option<usize>>,
}

impl Matching {
    /// Ground truth claimed by a true-positive prediction.
    pub fn true_positive(&self, pred: usize) -> Option<usize> {
        self.true_positive.get(pred).copied().flatten()
    }

    /// Ignore region that absorbed an otherwise unmatched prediction.
    pub fn ignored_by(&self, pred: usize) -> Option<usize> {
        self.ignored_by.get(pred).copied().flatten()
    }

    /// The prediction that claimed this ground truth, if it is used.
    pub fn claimant(&self, gt: usize) -> Option<usize> {
        self.claimed_by.get(gt).copied().flatten()
    }

    pub fn num_predictions(&self) -> usize {
        self.pred_class.len()
    }

    pub fn num_ground_truths(&self) -> usize {
        self.gt_class.len()
    }

    /// Best non-ignore ground truth for a prediction, used or not.
    ///
    /// Pure lookup over the overlap table; ties go to the lowest ground truth id.
    pub fn best_gt(&self, pred: usize, filter: GtFilter) -> Option<BestOverlap> {
        let class = *self.pred_class.get(pred)?;
        let table = self.tables.get(&self.pred_image[pred])?;
        let row = table.row(pred)?;

        let mut best: Option<BestOverlap> = None;
        for (&gt, &iou) in table.gt_ids().iter().zip(row) {
            if self.gt_ignore[gt] {
                continue;
            }
            let same = self.gt_class[gt] == class;
            let allowed = match filter {
                GtFilter::SameClass => same,
                GtFilter::OtherClass => !same,
                GtFilter::AnyClass => true,
            };
            if allowed && best.map_or(true, |b| iou > b.iou) {
                best = Some(BestOverlap { gt, iou });
            }
        }
        best
    }
}

/// Match predictions to ground truth image by image and class by class.
///
/// Within each (image, class) bucket predictions are visited by descending
/// score, ties by ascending id. Each one claims the highest-overlap unused,
/// non-ignore ground truth of its class when that overlap reaches
/// `config.pos_threshold`. A prediction that claims nothing but overlaps an
/// ignore region of its class at the positive threshold is absorbed by it.
///
/// # Errors
///
/// Returns [`TideError::MissingScore`] for an unscored prediction and
/// [`TideError::RegionMismatch`] when regions of one image cannot be compared.
pub fn match_predictions(gts: &Dataset, preds: &Dataset, config: &TideConfig) -> Result<Matching> {
    let mut matching = Matching {
        tables: BTreeMap::new(),
        pred_image: preds.annotations().iter().map(|a| a.image_id).collect(),
        pred_class: preds.annotations().iter().map(|a| a.class_id).collect(),
        gt_class: gts.annotations().iter().map(|a| a.class_id).collect(),
        gt_ignore: gts.annotations().iter().map(|a| a.ignore).collect(),
        claimed_by: vec![None; gts.len()],
        true_positive: vec![None; preds.len()],
        ignored_by: vec![None; preds.len()],
    };

    let scores = preds
        .annotations()
        .iter()
        .map(|ann| {
            ann.score.ok_or_else(|| TideError::MissingScore {
                dataset: preds.name().to_string(),
                annotation: ann.id,
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let image_ids: BTreeSet<u64> = gts
        .images()
        .keys()
        .chain(preds.images().keys())
        .copied()
        .collect();

    for image_id in image_ids {
        let gt_ids = gts.image_annotations(image_id);
        let pred_ids = preds.image_annotations(image_id);
        if pred_ids.is_empty() {
            continue;
        }

        let table = OverlapTable::build(gts, preds, gt_ids, pred_ids)?;

        // Bucket predictions by class, then rank each bucket
        let mut buckets: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for &pred in pred_ids {
            buckets.entry(matching.pred_class[pred]).or_default().push(pred);
        }

        for (class, mut bucket) in buckets {
            bucket.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

            for pred in bucket {
                let Some(row) = table.row(pred) else {
                    continue;
                };
                let candidates = table
                    .gt_ids()
                    .iter()
                    .zip(row)
                    .filter(|&(&gt, _)| matching.gt_class[gt] == class);

                let mut best_unused: Option<BestOverlap> = None;
                let mut best_ignore: Option<BestOverlap> = None;
                for (&gt, &iou) in candidates {
                    let slot = if matching.gt_ignore[gt] {
                        &mut best_ignore
                    } else if matching.claimed_by[gt].is_none() {
                        &mut best_unused
                    } else {
                        continue;
                    };
                    if slot.map_or(true, |b| iou > b.iou) {
                        *slot = Some(BestOverlap { gt, iou });
                    }
                }

                match (best_unused, best_ignore) {
                    (Some(best), _) if best.iou >= config.pos_threshold => {
                        matching.claimed_by[best.gt] = Some(pred);
                        matching.true_positive[pred] = Some(best.gt);
                    }
                    (_, Some(ignore)) if ignore.iou >= config.pos_threshold => {
                        matching.ignored_by[pred] = Some(ignore.gt);
                    }
                    _ => {}
                }
            }
        }

        matching.tables.insert(image_id, table);
    }

    log::debug!(
        "matched {} of {} predictions against {} ground truths",
        matching.true_positive.iter().filter(|tp| tp.is_some()).count(),
        preds.len(),
        gts.len()
    );

    Ok(matching)
}
