//! Per-class ranked detections, AP/mAP and counterfactual fixes.

use crate::diagnosis::{DetectionError, Fix};
use crate::metrics::ap::{calculate_ap, calculate_map};
use crate::metrics::precision_recall::build_precision_recall_curve;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One scored prediction in a class ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataPoint {
    pub pred: usize,
    pub score: f64,
    pub is_true: bool,
}

/// Ranking material for a single class.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassApData {
    pub num_gt_positives: usize,
    points: Vec<DataPoint>,
}

impl ClassApData {
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn num_true_positives(&self) -> usize {
        self.points.iter().filter(|p| p.is_true).count()
    }

    /// Average precision of this class, 0.0 without positives.
    pub fn ap(&self) -> f64 {
        if self.num_gt_positives == 0 {
            return 0.0;
        }
        let mut ranked = self.points.clone();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.pred.cmp(&b.pred)));
        let flags: Vec<bool> = ranked.iter().map(|p| p.is_true).collect();
        let (precisions, recalls) = build_precision_recall_curve(&flags, self.num_gt_positives);
        calculate_ap(&precisions, &recalls)
    }
}

/// AP material for every class of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApData {
    classes: BTreeMap<u64, ClassApData>,
    #[serde(skip)]
    index: BTreeMap<usize, u64>,
}

impl ApData {
    /// Empty data with an entry for each class.
    pub fn new(class_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            classes: class_ids
                .into_iter()
                .map(|id| (id, ClassApData::default()))
                .collect(),
            index: BTreeMap::new(),
        }
    }

    pub fn add_gt_positives(&mut self, class_id: u64, count: usize) {
        self.classes.entry(class_id).or_default().num_gt_positives += count;
    }

    pub fn push(&mut self, class_id: u64, point: DataPoint) {
        self.index.insert(point.pred, class_id);
        self.classes.entry(class_id).or_default().points.push(point);
    }

    pub fn class(&self, class_id: u64) -> Option<&ClassApData> {
        self.classes.get(&class_id)
    }

    pub fn classes(&self) -> &BTreeMap<u64, ClassApData> {
        &self.classes
    }

    /// AP per class, for every class known to the run.
    pub fn get_aps(&self) -> BTreeMap<u64, f64> {
        self.classes
            .iter()
            .map(|(&id, class)| (id, class.ap()))
            .collect()
    }

    /// Mean AP over the classes with at least one positive.
    pub fn get_map(&self) -> f64 {
        let aps: Vec<f64> = self
            .classes
            .values()
            .filter(|class| class.num_gt_positives > 0)
            .map(ClassApData::ap)
            .collect();
        calculate_map(&aps)
    }

    /// Copy restricted to the given predictions and per-class positive counts.
    ///
    /// The class set is exactly the keys of `positives`.
    pub fn restrict(
        &self,
        keep: &BTreeSet<usize>,
        positives: &BTreeMap<u64, usize>,
    ) -> ApData {
        let mut restricted = ApData::new(positives.keys().copied());
        for (&class_id, &count) in positives {
            restricted.add_gt_positives(class_id, count);
            if let Some(class) = self.classes.get(&class_id) {
                for point in class.points.iter().filter(|p| keep.contains(&p.pred)) {
                    restricted.push(class_id, *point);
                }
            }
        }
        restricted
    }

    /// Copy with every error in `errors` corrected, in the given order.
    ///
    /// A ground truth can be rescored onto once; later rescores of the same
    /// ground truth, and errors without a fix, suppress their prediction.
    pub fn fix_errors<'a>(&self, errors: impl IntoIterator<Item = &'a DetectionError>) -> ApData {
        let mut fixed = self.clone();
        let mut claimed = BTreeSet::new();
        for error in errors {
            fixed.apply(error, &mut claimed);
        }
        fixed
    }

    fn apply(&mut self, error: &DetectionError, claimed: &mut BTreeSet<usize>) {
        match error.fix() {
            Some(Fix::Rescore { class_id, gt }) => {
                let Some(pred) = error.pred() else {
                    return;
                };
                let point = self.remove(pred);
                if claimed.insert(gt) {
                    if let Some(point) = point {
                        self.push(
                            class_id,
                            DataPoint {
                                is_true: true,
                                ..point
                            },
                        );
                    }
                }
            }
            Some(Fix::DropPositive { class_id }) => {
                if let Some(class) = self.classes.get_mut(&class_id) {
                    class.num_gt_positives = class.num_gt_positives.saturating_sub(1);
                }
            }
            Some(Fix::SuppressFalsePositives) => {
                for class in self.classes.values_mut() {
                    class.points.retain(|p| p.is_true);
                }
                self.reindex();
            }
            Some(Fix::RecoverFalseNegatives) => {
                for class in self.classes.values_mut() {
                    class.num_gt_positives = class.num_true_positives();
                }
            }
            None => {
                if let Some(pred) = error.pred() {
                    self.remove(pred);
                }
            }
        }
    }

    fn remove(&mut self, pred: usize) -> Option<DataPoint> {
        let class_id = self.index.remove(&pred)?;
        let class = self.classes.get_mut(&class_id)?;
        let position = class.points.iter().position(|p| p.pred == pred)?;
        Some(class.points.remove(position))
    }

    fn reindex(&mut self) {
        self.index = self
            .classes
            .iter()
            .flat_map(|(&id, class)| class.points.iter().map(move |p| (p.pred, id)))
            .collect();
    }
}
