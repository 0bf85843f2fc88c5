//! Basic evaluation example demonstrating core functionality.

use std::collections::BTreeSet;
use tide_eval::{
    enlarge_dataset, load_from_string, metrics::iou::calculate_iou, BoundingBox, ClassIds,
    Dataset, ErrorKind, Tide, TideConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== TIDE Error Diagnosis Example ===\n");

    // Example 1: IoU Calculation
    println!("1. IoU Calculation");
    let bbox1 = BoundingBox::new(10.0, 10.0, 50.0, 50.0);
    let bbox2 = BoundingBox::new(30.0, 30.0, 50.0, 50.0);
    let iou = calculate_iou(&bbox1, &bbox2);
    println!("   IoU between overlapping boxes: {:.4}", iou);
    println!();

    // Example 2: Load a box table
    println!("2. Loading Box Records");
    let records = r#"[
        {"image_id": 1, "bbox_xywh": [100, 100, 200, 150], "is_gold": true, "is_pred": true,
         "gold": 1, "pred": 1, "confidence": 0.95},
        {"image_id": 1, "bbox_xywh": [105, 100, 200, 150], "is_gold": false, "is_pred": true,
         "pred": 1, "confidence": 0.60},
        {"image_id": 1, "bbox_xywh": [350, 200, 100, 120], "is_gold": true, "is_pred": true,
         "gold": 2, "pred": 1, "confidence": 0.80},
        {"image_id": 2, "bbox_xywh": [10, 10, 80, 80], "is_gold": true, "is_pred": false,
         "gold": 2},
        {"image_id": 2, "bbox_xywh": [60, 10, 80, 80], "is_gold": false, "is_pred": true,
         "pred": 2, "confidence": 0.70},
        {"image_id": 2, "bbox_xywh": [400, 400, 30, 30], "is_gold": false, "is_pred": true,
         "pred": 2, "confidence": 0.90}
    ]"#;
    let (gts, preds) = load_from_string(records)?;
    println!("   Loaded {} ground truths and {} predictions", gts.len(), preds.len());
    println!();

    // Example 3: Evaluate
    println!("3. Evaluation");
    let mut tide = Tide::new(TideConfig::default())?;
    let run = tide.evaluate(&gts, &preds, "demo")?.clone();
    println!("   mAP@50: {:.4}", run.get_map());
    for (class_id, ap) in run.get_aps() {
        println!("   AP class {}: {:.4}", class_id, ap);
    }
    println!();

    // Example 4: Error breakdown
    println!("4. Errors");
    for error in run.errors() {
        println!(
            "   {:<5} pred {:?} gt {:?}",
            error.code(),
            error.pred(),
            error.gt()
        );
    }
    println!();

    println!("5. mAP Impact per Error Kind");
    let counts = run.error_counts();
    for (kind, impact) in run.main_error_impacts() {
        println!(
            "   {:<5} count {:>2}  dAP {:+.4}",
            kind.short_name(),
            counts[&kind],
            impact
        );
    }
    for (kind, impact) in run.special_error_impacts() {
        println!("   {:<8} dAP {:+.4}", kind.short_name(), impact);
    }
    println!();

    // Example 6: Restrict to the second image without re-matching
    println!("6. Restriction");
    let gts_keep: BTreeSet<usize> = gts.image_annotations(2).iter().copied().collect();
    let preds_keep: BTreeSet<usize> = preds.image_annotations(2).iter().copied().collect();
    let by_class = |data: &Dataset, keep: &BTreeSet<usize>| {
        let mut dict = ClassIds::new();
        for &id in keep {
            if let Some(ann) = data.get(id) {
                dict.entry(ann.class_id).or_default().insert(id);
            }
        }
        dict
    };
    let pred_dict = by_class(&preds, &preds_keep);
    let gt_dict = by_class(&gts, &gts_keep);
    let filtered = tide.get_main_errors(&pred_dict, &gt_dict)?;
    for (name, errors) in &filtered {
        println!("   {}: {} errors", name, errors.len());
    }
    if let Some(map) = tide.run("demo")?.qualifiers().restricted_map {
        println!("   restricted mAP: {:.4}", map);
    }

    let enlarged = enlarge_dataset(&gts, &preds, &gts_keep, &preds_keep, &run)?;
    let sub = tide.evaluate(&enlarged.gts, &enlarged.preds, "image_2")?;
    println!(
        "   re-evaluated subset: {} background errors",
        sub.error_counts()[&ErrorKind::Background]
    );

    println!("\n=== Example Complete ===");
    Ok(())
}
