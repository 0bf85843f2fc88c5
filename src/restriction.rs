//! Re-indexed sub-datasets and the link closure that keeps a subset
//! evaluation identical to restricting the full one.

use crate::evaluator::Run;
use crate::error::{Result, TideError};
use crate::types::{Annotation, ClassIds, Dataset, IdMap, ImageEntry};
use std::collections::{BTreeMap, BTreeSet};

/// A re-indexed (ground truth, predictions) pair with provenance tables.
#[derive(Debug, Clone)]
pub struct FilteredPair {
    pub gts: Dataset,
    pub preds: Dataset,
    /// New ground truth id to the id it had in the source dataset.
    pub gt_new_to_old: IdMap,
    /// New prediction id to the id it had in the source dataset.
    pub pred_new_to_old: IdMap,
}

impl FilteredPair {
    /// Class-keyed new ids of the given original ids, as `(pred_dict, gt_dict)`.
    ///
    /// Feeds [`Run::restrict`] on a run of this pair. Ids that were not carried
    /// over are skipped.
    pub fn restriction_dicts(
        &self,
        gts_keep: &BTreeSet<usize>,
        preds_keep: &BTreeSet<usize>,
    ) -> (ClassIds, ClassIds) {
        (
            by_class(&self.preds, &self.pred_new_to_old, preds_keep),
            by_class(&self.gts, &self.gt_new_to_old, gts_keep),
        )
    }
}

fn by_class(data: &Dataset, new_to_old: &IdMap, keep: &BTreeSet<usize>) -> ClassIds {
    let mut dict = ClassIds::new();
    for (&new, old) in new_to_old {
        if keep.contains(old) {
            if let Some(ann) = data.get(new) {
                dict.entry(ann.class_id).or_default().insert(new);
            }
        }
    }
    dict
}

fn invert(map: &IdMap) -> BTreeMap<usize, usize> {
    map.iter().map(|(&new, &old)| (old, new)).collect()
}

fn check_ids(
    operation: &'static str,
    side: &'static str,
    ids: &BTreeSet<usize>,
    len: usize,
) -> Result<()> {
    match ids.iter().find(|&&id| id >= len) {
        Some(&id) => Err(TideError::UnknownAnnotation {
            operation,
            side,
            id,
            len,
        }),
        None => Ok(()),
    }
}

/// Copy of `data` holding only `ids_keep`, re-indexed densely in original order.
///
/// When `gt_new_to_old` is given, every `matched_with` is moved to the new id
/// of its ground truth, or cleared if that ground truth was not kept. Without
/// it, `matched_with` is cleared. Classes and images that keep no annotation
/// are dropped.
///
/// Returns the filtered dataset and its new-id to old-id table.
pub fn create_filtered_data(
    data: &Dataset,
    ids_keep: &BTreeSet<usize>,
    name: &str,
    gt_new_to_old: Option<&IdMap>,
) -> Result<(Dataset, IdMap)> {
    check_ids("create_filtered_data", "annotation", ids_keep, data.len())?;

    let gt_old_to_new = gt_new_to_old.map(invert);
    let mut new_to_old = IdMap::new();
    let mut annotations = Vec::with_capacity(ids_keep.len());
    let mut classes = BTreeMap::new();
    let mut images: BTreeMap<u64, ImageEntry> = BTreeMap::new();

    for (new, &old) in ids_keep.iter().enumerate() {
        let source = &data.annotations()[old];
        let matched_with = match (&gt_old_to_new, source.matched_with) {
            (Some(remap), Some(gt)) => remap.get(&gt).copied(),
            _ => None,
        };

        annotations.push(Annotation {
            id: new,
            matched_with,
            ..source.clone()
        });
        new_to_old.insert(new, old);

        if let Some(class_name) = data.classes().get(&source.class_id) {
            classes.insert(source.class_id, class_name.clone());
        }
        images
            .entry(source.image_id)
            .or_insert_with(|| ImageEntry {
                name: data
                    .images()
                    .get(&source.image_id)
                    .map(|image| image.name.clone())
                    .unwrap_or_else(|| format!("Image {}", source.image_id)),
                annotation_ids: Vec::new(),
            })
            .annotation_ids
            .push(new);
    }

    let filtered = Dataset::from_parts(name, annotations, classes, images)?;
    Ok((filtered, new_to_old))
}

/// Kept ids plus everything linked to them in `run`, re-indexed.
///
/// Links come from every error naming both a prediction and a ground truth,
/// every true positive, every prediction absorbed by an ignore region, and any
/// `matched_with` already carried by `preds`. The closure takes one hop:
/// the ground truths linked to kept predictions are added, then every
/// prediction linked to a ground truth in the enlarged set.
///
/// Evaluating the result and restricting it to the kept ids (see
/// [`FilteredPair::restriction_dicts`]) gives the same AP and errors as
/// [`Run::restrict`] on the full run.
///
/// # Errors
///
/// [`TideError::RunMismatch`] when `run` was not computed on these datasets,
/// [`TideError::UnknownAnnotation`] for out-of-range kept ids.
pub fn enlarge_dataset(
    gts: &Dataset,
    preds: &Dataset,
    gts_keep: &BTreeSet<usize>,
    preds_keep: &BTreeSet<usize>,
    run: &Run,
) -> Result<FilteredPair> {
    run.check_datasets("enlarge_dataset", Some(gts), Some(preds))?;
    check_ids("enlarge_dataset", "ground truth", gts_keep, gts.len())?;
    check_ids("enlarge_dataset", "prediction", preds_keep, preds.len())?;

    let mut links = run.links();
    for pred in preds.annotations() {
        if let Some(gt) = pred.matched_with {
            links.entry(pred.id).or_insert(gt);
        }
    }

    let mut gt_set = gts_keep.clone();
    gt_set.extend(preds_keep.iter().filter_map(|pred| links.get(pred)));

    let mut pred_set = preds_keep.clone();
    pred_set.extend(
        links
            .iter()
            .filter(|&(_, gt)| gt_set.contains(gt))
            .map(|(&pred, _)| pred),
    );

    log::debug!(
        "enlarged {}+{} kept ids to {} ground truths and {} predictions",
        gts_keep.len(),
        preds_keep.len(),
        gt_set.len(),
        pred_set.len()
    );

    let (gts_enlarged, gt_new_to_old) = create_filtered_data(gts, &gt_set, gts.name(), None)?;
    let annotated = run.annotated_predictions(preds)?;
    let (preds_enlarged, pred_new_to_old) =
        create_filtered_data(&annotated, &pred_set, preds.name(), Some(&gt_new_to_old))?;

    Ok(FilteredPair {
        gts: gts_enlarged,
        preds: preds_enlarged,
        gt_new_to_old,
        pred_new_to_old,
    })
}

/// Both datasets restricted to the annotations of one class.
pub fn filter_dataset_to_label(
    gts: &Dataset,
    preds: &Dataset,
    class_id: u64,
) -> Result<FilteredPair> {
    let ids_of = |data: &Dataset| -> BTreeSet<usize> {
        data.annotations()
            .iter()
            .filter(|ann| ann.class_id == class_id)
            .map(|ann| ann.id)
            .collect()
    };

    let (gts_filtered, gt_new_to_old) = create_filtered_data(gts, &ids_of(gts), gts.name(), None)?;
    let (preds_filtered, pred_new_to_old) =
        create_filtered_data(preds, &ids_of(preds), preds.name(), Some(&gt_new_to_old))?;

    Ok(FilteredPair {
        gts: gts_filtered,
        preds: preds_filtered,
        gt_new_to_old,
        pred_new_to_old,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Outcome;
    use crate::config::TideConfig;
    use crate::diagnosis::{DetectionError, ErrorKind};
    use crate::evaluator::evaluate;
    use crate::types::{BoundingBox, DatasetBuilder, Region};

    fn bbox(x: f64) -> Region {
        Region::Box(BoundingBox::new(x, 0.0, 10.0, 10.0))
    }

    fn duplicate_scenario() -> (Dataset, Dataset) {
        let mut gt = DatasetBuilder::new("gt");
        gt.add_ground_truth(1, 1, bbox(0.0));
        gt.add_ground_truth(2, 2, bbox(0.0));
        let mut pred = DatasetBuilder::new("pred");
        pred.add_prediction(1, 1, bbox(0.0), 0.9);
        pred.add_prediction(1, 1, bbox(0.5), 0.5);
        pred.add_prediction(2, 2, bbox(0.0), 0.7);
        (gt.build().unwrap(), pred.build().unwrap())
    }

    #[test]
    fn test_create_filtered_data_reindexes() {
        let (_, preds) = duplicate_scenario();
        let keep = BTreeSet::from([1, 2]);
        let (filtered, new_to_old) = create_filtered_data(&preds, &keep, "sub", None).unwrap();

        assert_eq!(filtered.name(), "sub");
        assert_eq!(filtered.len(), 2);
        assert_eq!(new_to_old, IdMap::from([(0, 1), (1, 2)]));
        assert_eq!(filtered.image_annotations(1), &[0]);
        assert_eq!(filtered.image_annotations(2), &[1]);
        assert_eq!(filtered.get(1).unwrap().score, Some(0.7));
    }

    #[test]
    fn test_create_filtered_data_drops_empty_tables() {
        let (gts, _) = duplicate_scenario();
        let (filtered, _) =
            create_filtered_data(&gts, &BTreeSet::from([1]), "sub", None).unwrap();
        assert_eq!(filtered.classes().keys().copied().collect::<Vec<u64>>(), vec![2]);
        assert_eq!(filtered.images().keys().copied().collect::<Vec<u64>>(), vec![2]);
    }

    #[test]
    fn test_create_filtered_data_unknown_id() {
        let (gts, _) = duplicate_scenario();
        let result = create_filtered_data(&gts, &BTreeSet::from([9]), "sub", None);
        assert!(matches!(result, Err(TideError::UnknownAnnotation { id: 9, len: 2, .. })));
    }

    #[test]
    fn test_enlarge_restores_duplicate_component() {
        let (gts, preds) = duplicate_scenario();
        let config = TideConfig::default();
        let run = evaluate(&gts, &preds, "full", &config).unwrap();
        let preds_keep = BTreeSet::from([1]);

        let enlarged = enlarge_dataset(&gts, &preds, &BTreeSet::new(), &preds_keep, &run).unwrap();
        assert_eq!(enlarged.gt_new_to_old, IdMap::from([(0, 0)]));
        assert_eq!(enlarged.pred_new_to_old, IdMap::from([(0, 0), (1, 1)]));
        // the true positive keeps its remapped link
        assert_eq!(enlarged.preds.get(0).unwrap().matched_with, Some(0));

        let sub = evaluate(&enlarged.gts, &enlarged.preds, "sub", &config).unwrap();
        assert_eq!(
            sub.errors(),
            &[DetectionError::Duplicate {
                pred: 1,
                gt: 0,
                suppressor: 0
            }]
        );
        assert_eq!(sub.outcome(1), Some(Outcome::Error { kind: ErrorKind::Duplicate }));
    }

    #[test]
    fn test_enlarge_rejects_foreign_run() {
        let (gts, preds) = duplicate_scenario();
        let run = evaluate(&gts, &preds, "full", &TideConfig::default()).unwrap();
        let (other, _) = create_filtered_data(&preds, &BTreeSet::from([0]), "pred", None).unwrap();

        let result = enlarge_dataset(&gts, &other, &BTreeSet::new(), &BTreeSet::new(), &run);
        assert!(matches!(result, Err(TideError::RunMismatch { .. })));
    }

    #[test]
    fn test_filter_dataset_to_label() {
        let (gts, preds) = duplicate_scenario();
        let run = evaluate(&gts, &preds, "full", &TideConfig::default()).unwrap();
        let annotated = run.annotated_predictions(&preds).unwrap();

        let pair = filter_dataset_to_label(&gts, &annotated, 2).unwrap();
        assert_eq!(pair.gts.len(), 1);
        assert_eq!(pair.preds.len(), 1);
        assert_eq!(pair.pred_new_to_old, IdMap::from([(0, 2)]));
        // gt 1 became gt 0
        assert_eq!(pair.preds.get(0).unwrap().matched_with, Some(0));
    }
}
