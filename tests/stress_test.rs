//! Stress tests with large datasets and complex scenarios.

use std::collections::BTreeSet;
use tide_eval::{
    enlarge_dataset, BoundingBox, ClassIds, Dataset, DatasetBuilder, ErrorKind, Region, Tide,
    TideConfig,
};

fn square(x: f64, y: f64, size: f64) -> Region {
    Region::Box(BoundingBox::new(x, y, size, size))
}

#[test]
fn test_1000_annotations_single_image() {
    let mut gt = DatasetBuilder::new("gt");
    let mut pred = DatasetBuilder::new("pred");

    for i in 0..1000 {
        let x = (i % 100) as f64 * 10.0;
        let y = (i / 100) as f64 * 10.0;
        gt.add_ground_truth(1, 1, square(x, y, 8.0));
        pred.add_prediction(1, 1, square(x, y, 8.0), 0.9 - (i as f64 / 10000.0));
    }

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "dense")
        .unwrap();

    assert!(run.errors().is_empty());
    assert!(run.get_map() > 0.99, "Should have high mAP with 1000 perfect matches");
}

#[test]
fn test_10_classes_10_images_10_annotations() {
    let mut gt = DatasetBuilder::new("gt");
    let mut pred = DatasetBuilder::new("pred");

    for class_id in 1..=10u64 {
        gt.add_class(class_id, format!("class_{}", class_id));
        pred.add_class(class_id, format!("class_{}", class_id));
        for image_id in 1..=10u64 {
            for obj_id in 0..10 {
                let x = (obj_id * 20) as f64;
                let y = (class_id * 10) as f64;
                gt.add_ground_truth(image_id, class_id, square(x, y, 15.0));
                pred.add_prediction(
                    image_id,
                    class_id,
                    square(x, y, 15.0),
                    0.85 + (obj_id as f64 / 100.0),
                );
            }
        }
    }

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "grid")
        .unwrap();

    // 10 classes x 10 images x 10 annotations = 1000 total
    assert_eq!(run.get_aps().len(), 10, "Should have 10 classes");
    assert!(run.get_map() > 0.99, "Should have high mAP");
}

#[test]
fn test_highly_overlapping_predictions() {
    // 10 GTs, 100 predictions (10 per GT, all overlapping)
    let mut gt = DatasetBuilder::new("gt");
    let mut pred = DatasetBuilder::new("pred");

    for i in 0..10 {
        let x = i as f64 * 100.0;
        gt.add_ground_truth(1, 1, square(x, 0.0, 50.0));
        for j in 0..10 {
            pred.add_prediction(
                1,
                1,
                square(x + j as f64, 0.0, 50.0),
                0.9 - (j as f64 / 100.0),
            );
        }
    }

    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide
        .evaluate(&gt.build().unwrap(), &pred.build().unwrap(), "dupes")
        .unwrap();

    let counts = run.error_counts();
    assert_eq!(counts[&ErrorKind::Duplicate], 90);
    assert_eq!(counts[&ErrorKind::Missed], 0);
    // every first hit outranks every duplicate, so duplicates cost nothing
    assert!((run.get_map() - 1.0).abs() < 1e-10);
    assert!(run.main_error_impacts()[&ErrorKind::Duplicate].abs() < 1e-10);
}

fn mixed_dataset() -> (Dataset, Dataset) {
    let mut gt = DatasetBuilder::new("gt");
    let mut pred = DatasetBuilder::new("pred");

    for i in 0..200u64 {
        let image = i / 20;
        let class = 1 + i % 4;
        let x = (i % 20) as f64 * 60.0;
        gt.add_ground_truth(image, class, square(x, 0.0, 40.0));

        let score = 1.0 - (i as f64 / 400.0);
        match i % 5 {
            0 | 1 => {
                pred.add_prediction(image, class, square(x, 0.0, 40.0), score);
            }
            2 => {
                pred.add_prediction(image, 1 + (class % 4), square(x, 0.0, 40.0), score);
            }
            3 => {
                pred.add_prediction(image, class, square(x + 25.0, 0.0, 40.0), score);
            }
            _ => {
                pred.add_prediction(image, class, square(x, 500.0, 40.0), score);
            }
        }
    }

    (gt.build().unwrap(), pred.build().unwrap())
}

#[test]
fn test_mixed_errors_at_scale() {
    let (gts, preds) = mixed_dataset();
    let mut tide = Tide::new(TideConfig::default()).unwrap();
    let run = tide.evaluate(&gts, &preds, "mixed").unwrap();

    let counts = run.error_counts();
    assert_eq!(counts[&ErrorKind::Class], 40);
    assert_eq!(counts[&ErrorKind::Box], 40);
    assert_eq!(counts[&ErrorKind::Background], 40);
    assert_eq!(counts[&ErrorKind::Missed], 120);

    let map = run.get_map();
    // recall tops out at 0.4 in every class
    assert!(map > 0.1 && map < 0.41, "mAP should be moderate, got {}", map);
}

#[test]
fn test_restriction_queries_at_scale() {
    let (gts, preds) = mixed_dataset();
    let mut tide = Tide::new(TideConfig::default()).unwrap();
    tide.evaluate(&gts, &preds, "mixed").unwrap();

    for class in 1..=4u64 {
        let pred_dict: ClassIds = preds
            .ids_by_class()
            .into_iter()
            .filter(|&(c, _)| c == class)
            .collect();
        let gt_dict: ClassIds = gts
            .ids_by_class()
            .into_iter()
            .filter(|&(c, _)| c == class)
            .collect();

        let errors = tide.get_main_errors(&pred_dict, &gt_dict).unwrap();
        let run = tide.run("mixed").unwrap();
        assert_eq!(run.qualifiers().restricted_aps.as_ref().unwrap().len(), 1);
        assert!(!errors["filtered_errors_in_run_mixed"].is_empty());
    }
    assert_eq!(tide.run("mixed").unwrap().qualifiers().cache_len(), 4);

    let run = tide.run("mixed").unwrap();
    let preds_keep: BTreeSet<usize> = (0..preds.len()).step_by(7).collect();
    let enlarged = enlarge_dataset(&gts, &preds, &BTreeSet::new(), &preds_keep, run).unwrap();
    assert!(enlarged.preds.len() >= preds_keep.len());
}
