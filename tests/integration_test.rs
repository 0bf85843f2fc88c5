//! Integration tests for the complete diagnosis pipeline.

use approx::assert_abs_diff_eq;
use std::collections::{BTreeMap, BTreeSet};
use tide_eval::{
    enlarge_dataset, BestGtMatch, BoundingBox, ClassIds, Dataset, DatasetBuilder, DetectionError,
    ErrorKind, Outcome, Region, Rle, Tide, TideConfig,
};

fn bbox(x: f64, y: f64) -> Region {
    Region::Box(BoundingBox::new(x, y, 10.0, 10.0))
}

/// One image exercising every main error kind.
///
/// gt 0 (class 1) is found, gt 1 (class 2) and gt 2 (class 1) are missed.
fn mixed_errors() -> (Dataset, Dataset) {
    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, bbox(0.0, 0.0));
    gt.add_ground_truth(1, 2, bbox(50.0, 0.0));
    gt.add_ground_truth(1, 1, bbox(100.0, 0.0));

    let mut pred = DatasetBuilder::new("pred");
    pred.add_prediction(1, 1, bbox(0.0, 0.0), 0.9); // true positive
    pred.add_prediction(1, 1, bbox(1.0, 0.0), 0.8); // duplicate of 0
    pred.add_prediction(1, 1, bbox(50.0, 0.0), 0.7); // wrong class
    pred.add_prediction(1, 1, bbox(107.0, 0.0), 0.6); // poor box
    pred.add_prediction(1, 3, bbox(57.0, 0.0), 0.5); // wrong class, poor box
    pred.add_prediction(1, 1, bbox(300.0, 300.0), 0.4); // background

    (gt.build().unwrap(), pred.build().unwrap())
}

#[test]
fn test_perfect_predictions() {
    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, bbox(10.0, 10.0));
    gt.add_ground_truth(1, 1, bbox(100.0, 100.0));
    let mut pred = DatasetBuilder::new("pred");
    pred.add_prediction(1, 1, bbox(10.0, 10.0), 0.95);
    pred.add_prediction(1, 1, bbox(100.0, 100.0), 0.90);

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "perfect")
        .unwrap();

    assert!(run.errors().is_empty());
    assert_abs_diff_eq!(run.get_map(), 1.0, epsilon = 1e-10);
    assert!(run.main_error_impacts().values().all(|&impact| impact == 0.0));
}

#[test]
fn test_every_error_kind() {
    let (gts, preds) = mixed_errors();
    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide.evaluate(&gts, &preds, "mixed").unwrap();

    assert_eq!(
        run.errors(),
        &[
            DetectionError::Duplicate {
                pred: 1,
                gt: 0,
                suppressor: 0
            },
            DetectionError::Class {
                pred: 2,
                gt: 1,
                gt_class: 2,
                best_match: Some(BestGtMatch { pred: 2, gt: 1 }),
            },
            DetectionError::Box {
                pred: 3,
                gt: 2,
                pred_class: 1,
                best_match: Some(BestGtMatch { pred: 3, gt: 2 }),
            },
            DetectionError::ClassBox { pred: 4, gt: 1 },
            DetectionError::Background { pred: 5 },
            DetectionError::Missed { gt: 1, gt_class: 2 },
            DetectionError::Missed { gt: 2, gt_class: 1 },
        ]
    );

    let counts = run.error_counts();
    assert_eq!(counts[&ErrorKind::Missed], 2);
    assert!(ErrorKind::MAIN
        .iter()
        .filter(|&&kind| kind != ErrorKind::Missed)
        .all(|kind| counts[kind] == 1));

    assert_eq!(run.outcome(0), Some(Outcome::TruePositive { gt: 0 }));
    assert_eq!(run.outcome(4), Some(Outcome::Error { kind: ErrorKind::ClassBox }));
}

#[test]
fn test_ap_and_impacts() {
    let (gts, preds) = mixed_errors();
    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide.evaluate(&gts, &preds, "mixed").unwrap();

    // class 1: one true positive ranked first out of two positives
    let aps = run.get_aps();
    assert_eq!(aps.keys().copied().collect::<Vec<u64>>(), vec![1, 2, 3]);
    assert_abs_diff_eq!(aps[&1], 51.0 / 101.0, epsilon = 1e-10);
    assert_eq!(aps[&2], 0.0);
    assert_eq!(aps[&3], 0.0);
    // class 3 has no ground truth and stays out of the mean
    assert_abs_diff_eq!(run.get_map(), 51.0 / 202.0, epsilon = 1e-10);

    let impacts = run.main_error_impacts();
    assert_abs_diff_eq!(impacts[&ErrorKind::Class], 0.5, epsilon = 1e-10);
    assert_abs_diff_eq!(impacts[&ErrorKind::Box], 25.0 / 202.0, epsilon = 1e-10);
    assert_abs_diff_eq!(impacts[&ErrorKind::Duplicate], 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(impacts[&ErrorKind::Background], 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(impacts[&ErrorKind::ClassBox], 0.0, epsilon = 1e-10);
    assert!(impacts[&ErrorKind::Missed] > 0.0);

    let box_error = &run.errors()[2];
    assert_abs_diff_eq!(run.error_impact(box_error), 25.0 / 202.0, epsilon = 1e-10);

    let special = run.special_error_impacts();
    assert_eq!(special.len(), 2);
    assert!(special[&ErrorKind::FalsePositive] >= 0.0);
    assert!(special[&ErrorKind::FalseNegative] > 0.0);
}

#[test]
fn test_background_impact() {
    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, bbox(0.0, 0.0));
    let mut pred = DatasetBuilder::new("pred");
    pred.add_prediction(1, 1, bbox(0.0, 0.0), 0.9);
    pred.add_prediction(1, 1, bbox(100.0, 100.0), 0.95);

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "bkg")
        .unwrap();

    assert_abs_diff_eq!(run.get_map(), 0.5, epsilon = 1e-10);
    assert_abs_diff_eq!(run.main_error_impacts()[&ErrorKind::Background], 0.5, epsilon = 1e-10);
    assert_abs_diff_eq!(
        run.special_error_impacts()[&ErrorKind::FalsePositive],
        0.5,
        epsilon = 1e-10
    );
    assert_abs_diff_eq!(
        run.special_error_impacts()[&ErrorKind::FalseNegative],
        0.0,
        epsilon = 1e-10
    );
}

#[test]
fn test_duplicate_scenario_with_enlargement() {
    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, bbox(0.0, 0.0));
    let mut pred = DatasetBuilder::new("pred");
    pred.add_prediction(1, 1, bbox(0.0, 0.0), 0.9);
    pred.add_prediction(1, 1, bbox(0.0, 0.0), 0.5);
    let (gts, preds) = (gt.build().unwrap(), pred.build().unwrap());

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide.evaluate(&gts, &preds, "full").unwrap().clone();
    assert_eq!(
        run.errors(),
        &[DetectionError::Duplicate {
            pred: 1,
            gt: 0,
            suppressor: 0
        }]
    );

    let preds_keep = BTreeSet::from([1]);
    let enlarged = enlarge_dataset(&gts, &preds, &BTreeSet::new(), &preds_keep, &run).unwrap();
    assert_eq!(enlarged.gts.len(), 1);
    assert_eq!(enlarged.preds.len(), 2);

    let sub = tide.evaluate(&enlarged.gts, &enlarged.preds, "enlarged").unwrap();
    assert_eq!(sub.outcome(1), Some(Outcome::Error { kind: ErrorKind::Duplicate }));
    assert_eq!(tide.runs().len(), 2);
}

#[test]
fn test_get_main_errors_across_runs() {
    let (gts, preds) = mixed_errors();
    let mut tide = Tide::new(TideConfig::default()).unwrap();
    tide.evaluate(&gts, &preds, "a").unwrap();
    tide.evaluate(&gts, &preds, "b").unwrap();

    // keep the wrong-class prediction and the ground truth it points at
    let pred_dict = ClassIds::from([(1, BTreeSet::from([2]))]);
    let gt_dict = ClassIds::from([(2, BTreeSet::from([1]))]);
    let result = tide.get_main_errors(&pred_dict, &gt_dict).unwrap();

    assert_eq!(
        result.keys().cloned().collect::<Vec<String>>(),
        vec!["filtered_errors_in_run_a", "filtered_errors_in_run_b"]
    );
    let errors = &result["filtered_errors_in_run_a"];
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].kind(), ErrorKind::Class);
    assert_eq!(errors[1], DetectionError::Missed { gt: 1, gt_class: 2 });

    let qualifiers = tide.run("a").unwrap().qualifiers();
    let restricted = qualifiers.restricted_aps.clone().unwrap();
    assert_eq!(restricted, BTreeMap::from([(1, 0.0), (2, 0.0)]));
    // only class 2 has a kept positive
    assert_eq!(qualifiers.restricted_map, Some(0.0));
}

#[test]
fn test_annotated_predictions() {
    let (gts, preds) = mixed_errors();
    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide.evaluate(&gts, &preds, "mixed").unwrap();

    let annotated = run.annotated_predictions(&preds).unwrap();
    assert_eq!(annotated.get(0).unwrap().matched_with, Some(0));
    assert!(annotated.annotations()[1..].iter().all(|a| a.matched_with.is_none()));
    // the source dataset is untouched
    assert!(preds.annotations().iter().all(|a| a.matched_with.is_none()));
}

#[test]
fn test_ignore_region_is_neither_scored_nor_missed() {
    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, bbox(0.0, 0.0));
    gt.add_ignored_ground_truth(1, 1, bbox(40.0, 0.0));
    let mut pred = DatasetBuilder::new("pred");
    pred.add_prediction(1, 1, bbox(0.0, 0.0), 0.6);
    pred.add_prediction(1, 1, bbox(40.0, 0.0), 0.9);

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "crowd")
        .unwrap();

    assert_eq!(run.outcome(1), Some(Outcome::Ignored { gt: 1 }));
    assert!(run.errors().is_empty());
    assert_abs_diff_eq!(run.get_map(), 1.0, epsilon = 1e-10);
}

#[test]
fn test_mask_regions() {
    // 4x4 masks, column-major: left half vs top-left quarter
    let left = Region::Mask(Rle::new(4, 4, vec![0, 8, 8]));
    let quarter = Region::Mask(Rle::new(4, 4, vec![0, 2, 2, 2, 10]));

    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, left.clone());
    let mut pred = DatasetBuilder::new("pred");
    pred.add_prediction(1, 1, left, 0.9);
    pred.add_prediction(1, 1, quarter, 0.8);

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "masks")
        .unwrap();

    assert_eq!(run.matched_with(0), Some(0));
    // the quarter overlaps the claimed gt with iou 0.5
    assert_eq!(run.outcome(1), Some(Outcome::Error { kind: ErrorKind::Duplicate }));
}

#[test]
fn test_stricter_threshold_turns_hits_into_box_errors() {
    let mut gt = DatasetBuilder::new("gt");
    gt.add_ground_truth(1, 1, bbox(0.0, 0.0));
    let mut pred = DatasetBuilder::new("pred");
    // iou = 80 / 120
    pred.add_prediction(1, 1, bbox(2.0, 0.0), 0.9);
    let (gts, preds) = (gt.build().unwrap(), pred.build().unwrap());

    let mut loose = Tide::new(TideConfig::default()).unwrap();
    assert_eq!(loose.evaluate(&gts, &preds, "loose").unwrap().matched_with(0), Some(0));

    let mut strict = Tide::new(TideConfig::with_pos_threshold(0.75)).unwrap();
    let run = strict.evaluate(&gts, &preds, "strict").unwrap();
    assert_eq!(run.error_counts()[&ErrorKind::Box], 1);
    assert_eq!(run.error_counts()[&ErrorKind::Missed], 1);
}
