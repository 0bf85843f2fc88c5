//! Evaluation orchestrator: matching, classification and AP for one named run.

use crate::ap_data::{ApData, DataPoint};
use crate::classifier::{classify, Outcome};
use crate::config::TideConfig;
use crate::diagnosis::{DetectionError, ErrorKind};
use crate::error::{Result, TideError};
use crate::matching::match_predictions;
use crate::types::{ClassIds, Dataset};
use std::collections::{BTreeMap, BTreeSet};

/// AP and surviving errors of a run restricted to a subset of annotation ids.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedView {
    pub aps: BTreeMap<u64, f64>,
    pub map: f64,
    pub errors: Vec<DetectionError>,
}

/// Lazily filled results of restriction queries on a run.
///
/// `restricted_aps` / `restricted_map` hold the latest query; every query is
/// also memoized under its exact `pred_dict`, then `gt_dict`.
#[derive(Debug, Clone, Default)]
pub struct Qualifiers {
    pub restricted_aps: Option<BTreeMap<u64, f64>>,
    pub restricted_map: Option<f64>,
    cache: BTreeMap<ClassIds, BTreeMap<ClassIds, RestrictedView>>,
}

impl Qualifiers {
    pub fn cached(&self, pred_dict: &ClassIds, gt_dict: &ClassIds) -> Option<&RestrictedView> {
        self.cache.get(pred_dict)?.get(gt_dict)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.values().map(BTreeMap::len).sum()
    }
}

/// Result of one evaluation: outcomes, errors and AP data.
///
/// Read-only after [`evaluate`] apart from the [`Qualifiers`] cache.
#[derive(Debug, Clone)]
pub struct Run {
    name: String,
    config: TideConfig,
    gt_name: String,
    pred_name: String,
    gt_classes: Vec<u64>,
    gt_images: Vec<u64>,
    gt_ignore: Vec<bool>,
    pred_classes: Vec<u64>,
    pred_images: Vec<u64>,
    pred_scores: Vec<f64>,
    outcomes: Vec<Outcome>,
    errors: Vec<DetectionError>,
    ap_data: ApData,
    qualifiers: Qualifiers,
}

/// Evaluate predictions against ground truth.
///
/// Matches every (image, class) bucket greedily, classifies each prediction
/// and each unclaimed ground truth, and builds per-class AP data.
///
/// # Errors
///
/// Fails on invalid thresholds, unscored predictions, incomparable regions,
/// or when both datasets name the same class or image differently.
pub fn evaluate(gt: &Dataset, preds: &Dataset, name: &str, config: &TideConfig) -> Result<Run> {
    config.validate()?;
    check_vocabulary(gt, preds)?;

    let matching = match_predictions(gt, preds, config)?;

    let gt_classes: Vec<u64> = gt.annotations().iter().map(|a| a.class_id).collect();
    let gt_images: Vec<u64> = gt.annotations().iter().map(|a| a.image_id).collect();
    let gt_ignore: Vec<bool> = gt.annotations().iter().map(|a| a.ignore).collect();
    let pred_classes: Vec<u64> = preds.annotations().iter().map(|a| a.class_id).collect();
    let pred_images: Vec<u64> = preds.annotations().iter().map(|a| a.image_id).collect();
    let pred_scores = preds
        .annotations()
        .iter()
        .map(|a| {
            a.score.ok_or_else(|| TideError::MissingScore {
                dataset: preds.name().to_string(),
                annotation: a.id,
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let classification = classify(&matching, &pred_classes, &gt_classes, &gt_ignore, config);

    let class_ids: BTreeSet<u64> = gt_classes.iter().chain(&pred_classes).copied().collect();
    let mut ap_data = ApData::new(class_ids);
    for (&class, &ignore) in gt_classes.iter().zip(&gt_ignore) {
        if !ignore {
            ap_data.add_gt_positives(class, 1);
        }
    }
    for (pred, outcome) in classification.outcomes.iter().enumerate() {
        if matches!(outcome, Outcome::Ignored { .. }) {
            continue;
        }
        ap_data.push(
            pred_classes[pred],
            DataPoint {
                pred,
                score: pred_scores[pred],
                is_true: outcome.is_true_positive(),
            },
        );
    }

    let run = Run {
        name: name.to_string(),
        config: *config,
        gt_name: gt.name().to_string(),
        pred_name: preds.name().to_string(),
        gt_classes,
        gt_images,
        gt_ignore,
        pred_classes,
        pred_images,
        pred_scores,
        outcomes: classification.outcomes,
        errors: classification.errors,
        ap_data,
        qualifiers: Qualifiers::default(),
    };

    log::info!(
        "run '{}': {} predictions, {} ground truths, {} errors, mAP {:.4}",
        run.name,
        run.pred_classes.len(),
        run.gt_classes.len(),
        run.errors.len(),
        run.get_map()
    );

    Ok(run)
}

fn check_vocabulary(gt: &Dataset, preds: &Dataset) -> Result<()> {
    for (id, name) in preds.classes() {
        if let Some(gt_name) = gt.classes().get(id) {
            if gt_name != name {
                return Err(TideError::CategoryMismatch(format!(
                    "class {} is '{}' in '{}' but '{}' in '{}'",
                    id,
                    gt_name,
                    gt.name(),
                    name,
                    preds.name()
                )));
            }
        }
    }
    for (id, image) in preds.images() {
        if let Some(gt_image) = gt.images().get(id) {
            if gt_image.name != image.name {
                return Err(TideError::ImageMismatch(format!(
                    "image {} is '{}' in '{}' but '{}' in '{}'",
                    id,
                    gt_image.name,
                    gt.name(),
                    image.name,
                    preds.name()
                )));
            }
        }
    }
    Ok(())
}

impl Run {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TideConfig {
        &self.config
    }

    /// Every diagnosed error: prediction errors first, then misses.
    pub fn errors(&self) -> &[DetectionError] {
        &self.errors
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn outcome(&self, pred: usize) -> Option<Outcome> {
        self.outcomes.get(pred).copied()
    }

    /// Ground truth a true-positive prediction was scored against.
    pub fn matched_with(&self, pred: usize) -> Option<usize> {
        match self.outcome(pred)? {
            Outcome::TruePositive { gt } => Some(gt),
            _ => None,
        }
    }

    pub fn num_predictions(&self) -> usize {
        self.pred_classes.len()
    }

    pub fn num_ground_truths(&self) -> usize {
        self.gt_classes.len()
    }

    pub fn ap_data(&self) -> &ApData {
        &self.ap_data
    }

    pub fn get_aps(&self) -> BTreeMap<u64, f64> {
        self.ap_data.get_aps()
    }

    pub fn get_map(&self) -> f64 {
        self.ap_data.get_map()
    }

    pub fn qualifiers(&self) -> &Qualifiers {
        &self.qualifiers
    }

    /// Number of errors of each main kind (zero counts included).
    pub fn error_counts(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts: BTreeMap<ErrorKind, usize> =
            ErrorKind::MAIN.iter().map(|&kind| (kind, 0)).collect();
        for error in &self.errors {
            *counts.entry(error.kind()).or_default() += 1;
        }
        counts
    }

    /// Every recorded prediction to ground truth link.
    ///
    /// Covers true positives, ignore regions and errors that name a ground truth.
    pub fn links(&self) -> BTreeMap<usize, usize> {
        let mut links: BTreeMap<usize, usize> =
            self.errors.iter().filter_map(DetectionError::link).collect();
        for (pred, outcome) in self.outcomes.iter().enumerate() {
            match *outcome {
                Outcome::TruePositive { gt } | Outcome::Ignored { gt } => {
                    links.insert(pred, gt);
                }
                Outcome::Error { .. } => {}
            }
        }
        links
    }

    /// Copy of `preds` with `matched_with` set on every true positive.
    pub fn annotated_predictions(&self, preds: &Dataset) -> Result<Dataset> {
        self.check_datasets("annotated_predictions", None, Some(preds))?;
        Ok(preds.with_matches(|pred| self.matched_with(pred)))
    }

    /// Fails unless `gts` / `preds` are the datasets this run was evaluated on:
    /// same name, size, and per-annotation class and image (and score for predictions).
    pub(crate) fn check_datasets(
        &self,
        operation: &'static str,
        gts: Option<&Dataset>,
        preds: Option<&Dataset>,
    ) -> Result<()> {
        let mismatch = |reason: String| TideError::RunMismatch {
            operation,
            run: self.name.clone(),
            reason,
        };
        if let Some(gts) = gts {
            if gts.name() != self.gt_name || gts.len() != self.gt_classes.len() {
                return Err(mismatch(format!(
                    "ground truth '{}' has {} annotations, run saw '{}' with {}",
                    gts.name(),
                    gts.len(),
                    self.gt_name,
                    self.gt_classes.len()
                )));
            }
            let differing = gts.annotations().iter().find(|a| {
                a.class_id != self.gt_classes[a.id] || a.image_id != self.gt_images[a.id]
            });
            if let Some(a) = differing {
                return Err(mismatch(format!(
                    "ground truth {} is class {} in image {}, run saw class {} in image {}",
                    a.id, a.class_id, a.image_id, self.gt_classes[a.id], self.gt_images[a.id]
                )));
            }
        }
        if let Some(preds) = preds {
            if preds.name() != self.pred_name || preds.len() != self.pred_classes.len() {
                return Err(mismatch(format!(
                    "predictions '{}' have {} annotations, run saw '{}' with {}",
                    preds.name(),
                    preds.len(),
                    self.pred_name,
                    self.pred_classes.len()
                )));
            }
            let differing = preds.annotations().iter().find(|a| {
                a.class_id != self.pred_classes[a.id]
                    || a.image_id != self.pred_images[a.id]
                    || a.score.map(f64::to_bits) != Some(self.pred_scores[a.id].to_bits())
            });
            if let Some(a) = differing {
                return Err(mismatch(format!(
                    "prediction {} is class {} in image {} with score {:?}, \
                     run saw class {} in image {} with score {}",
                    a.id,
                    a.class_id,
                    a.image_id,
                    a.score,
                    self.pred_classes[a.id],
                    self.pred_images[a.id],
                    self.pred_scores[a.id]
                )));
            }
        }
        Ok(())
    }

    /// mAP gained by fixing all errors of each main kind at once.
    pub fn main_error_impacts(&self) -> BTreeMap<ErrorKind, f64> {
        let base = self.get_map();
        ErrorKind::MAIN
            .iter()
            .map(|&kind| {
                let fixed = self.ap_data.fix_errors(self.ranked_errors(kind));
                (kind, fixed.get_map() - base)
            })
            .collect()
    }

    /// mAP gained with perfect precision (`FalsePositive`) or perfect recall (`FalseNegative`).
    pub fn special_error_impacts(&self) -> BTreeMap<ErrorKind, f64> {
        let base = self.get_map();
        [DetectionError::FalsePositive, DetectionError::FalseNegative]
            .iter()
            .map(|error| {
                let fixed = self.ap_data.fix_errors([error]);
                (error.kind(), fixed.get_map() - base)
            })
            .collect()
    }

    /// mAP gained by fixing this one error.
    pub fn error_impact(&self, error: &DetectionError) -> f64 {
        self.ap_data.fix_errors([error]).get_map() - self.get_map()
    }

    /// Errors of one kind, highest-scoring prediction first.
    fn ranked_errors(&self, kind: ErrorKind) -> Vec<&DetectionError> {
        let mut errors: Vec<&DetectionError> =
            self.errors.iter().filter(|e| e.kind() == kind).collect();
        errors.sort_by(|a, b| match (a.pred(), b.pred()) {
            (Some(pa), Some(pb)) => self.pred_scores[pb]
                .total_cmp(&self.pred_scores[pa])
                .then(pa.cmp(&pb)),
            _ => a.gt().cmp(&b.gt()),
        });
        errors
    }

    /// Restrict this run to the given original ids without re-matching.
    ///
    /// `pred_dict` / `gt_dict` map a class id to the annotation ids kept for it.
    /// AP is recomputed from the kept ranking; errors survive when their
    /// prediction (or, for misses, their ground truth) is kept.
    pub fn restrict(&self, pred_dict: &ClassIds, gt_dict: &ClassIds) -> Result<RestrictedView> {
        let (pred_keep, gt_keep) = self.check_query(pred_dict, gt_dict)?;

        let mut positives: BTreeMap<u64, usize> = BTreeMap::new();
        for (&class, ids) in pred_dict.iter().chain(gt_dict) {
            if !ids.is_empty() {
                positives.entry(class).or_insert(0);
            }
        }
        for &gt in &gt_keep {
            if !self.gt_ignore[gt] {
                *positives.entry(self.gt_classes[gt]).or_default() += 1;
            }
        }

        let ap_data = self.ap_data.restrict(&pred_keep, &positives);
        let errors = self
            .errors
            .iter()
            .filter(|error| match (error.pred(), error.gt()) {
                (Some(pred), _) => pred_keep.contains(&pred),
                (None, Some(gt)) => gt_keep.contains(&gt),
                (None, None) => false,
            })
            .cloned()
            .collect();

        Ok(RestrictedView {
            aps: ap_data.get_aps(),
            map: ap_data.get_map(),
            errors,
        })
    }

    /// Kept prediction and ground truth ids of a restriction query.
    fn check_query(
        &self,
        pred_dict: &ClassIds,
        gt_dict: &ClassIds,
    ) -> Result<(BTreeSet<usize>, BTreeSet<usize>)> {
        Ok((
            collect_ids("prediction", pred_dict, &self.pred_classes)?,
            collect_ids("ground truth", gt_dict, &self.gt_classes)?,
        ))
    }

    /// [`Run::restrict`] through the qualifiers cache.
    pub fn restrict_cached(
        &mut self,
        pred_dict: &ClassIds,
        gt_dict: &ClassIds,
    ) -> Result<&RestrictedView> {
        if self.qualifiers.cached(pred_dict, gt_dict).is_none() {
            let view = self.restrict(pred_dict, gt_dict)?;
            self.qualifiers
                .cache
                .entry(pred_dict.clone())
                .or_default()
                .insert(gt_dict.clone(), view);
        } else {
            log::debug!("run '{}': restriction served from cache", self.name);
        }

        let view = &self.qualifiers.cache[pred_dict][gt_dict];
        self.qualifiers.restricted_aps = Some(view.aps.clone());
        self.qualifiers.restricted_map = Some(view.map);
        Ok(view)
    }
}

fn collect_ids(
    side: &'static str,
    dict: &ClassIds,
    classes: &[u64],
) -> Result<BTreeSet<usize>> {
    let mut keep = BTreeSet::new();
    for (&class, ids) in dict {
        for &id in ids {
            let actual = *classes.get(id).ok_or_else(|| TideError::UnknownAnnotation {
                operation: "get_main_errors",
                side,
                id,
                len: classes.len(),
            })?;
            if actual != class {
                return Err(TideError::ClassMismatch {
                    operation: "get_main_errors",
                    side,
                    id,
                    actual,
                    requested: class,
                });
            }
            keep.insert(id);
        }
    }
    Ok(keep)
}

/// Holds the evaluation thresholds and every named run.
#[derive(Debug, Clone, Default)]
pub struct Tide {
    config: TideConfig,
    runs: BTreeMap<String, Run>,
}

impl Tide {
    pub fn new(config: TideConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            runs: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &TideConfig {
        &self.config
    }

    /// Evaluate and store the run under `name`, replacing any previous one.
    pub fn evaluate(&mut self, gt: &Dataset, preds: &Dataset, name: &str) -> Result<&Run> {
        let run = evaluate(gt, preds, name, &self.config)?;
        self.runs.insert(name.to_string(), run);
        self.run(name)
    }

    pub fn run(&self, name: &str) -> Result<&Run> {
        self.runs
            .get(name)
            .ok_or_else(|| TideError::UnknownRun(name.to_string()))
    }

    pub fn runs(&self) -> &BTreeMap<String, Run> {
        &self.runs
    }

    /// Main errors of every run restricted to the given original ids.
    ///
    /// Results are keyed `filtered_errors_in_run_{name}`; each run's
    /// qualifiers receive `restricted_aps` and `restricted_map`. The ids are
    /// checked against every run before any qualifiers change.
    pub fn get_main_errors(
        &mut self,
        pred_dict: &ClassIds,
        gt_dict: &ClassIds,
    ) -> Result<BTreeMap<String, Vec<DetectionError>>> {
        for run in self.runs.values() {
            run.check_query(pred_dict, gt_dict)?;
        }

        let mut result = BTreeMap::new();
        for (name, run) in &mut self.runs {
            let view = run.restrict_cached(pred_dict, gt_dict)?;
            let main: Vec<DetectionError> = view
                .errors
                .iter()
                .filter(|e| ErrorKind::MAIN.contains(&e.kind()))
                .cloned()
                .collect();
            result.insert(format!("filtered_errors_in_run_{}", name), main);
        }
        Ok(result)
    }
}
