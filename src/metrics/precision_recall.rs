//! Precision-recall curves over a ranked list of detections.

/// Build a precision-recall curve from ranked true/false positive flags.
///
/// # Arguments
///
/// * `is_true_positive` - One flag per detection, sorted by confidence descending
/// * `num_ground_truth` - Number of scorable ground truth annotations
///
/// # Returns
///
/// Returns `(precisions, recalls)`, one entry per ranked detection.
///
/// # Example
///
/// ```
/// use tide_eval::metrics::precision_recall::build_precision_recall_curve;
///
/// let (precisions, recalls) = build_precision_recall_curve(&[true, false, true], 4);
/// assert_eq!(precisions, vec![1.0, 0.5, 2.0 / 3.0]);
/// assert_eq!(recalls, vec![0.25, 0.25, 0.5]);
/// ```
pub fn build_precision_recall_curve(
    is_true_positive: &[bool],
    num_ground_truth: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut precisions = Vec::with_capacity(is_true_positive.len());
    let mut recalls = Vec::with_capacity(is_true_positive.len());

    let mut tp = 0usize;
    let mut fp = 0usize;

    for &is_tp in is_true_positive {
        if is_tp {
            tp += 1;
        } else {
            fp += 1;
        }

        precisions.push(tp as f64 / (tp + fp) as f64);

        let recall = if num_ground_truth > 0 {
            tp as f64 / num_ground_truth as f64
        } else {
            0.0
        };
        recalls.push(recall);
    }

    (precisions, recalls)
}

/// Interpolate precision values for standard recall levels.
///
/// Uses the COCO-style 101-point interpolation.
///
/// # Arguments
///
/// * `precision` - Precision values (in ranking order)
/// * `recall` - Recall values (in ranking order)
///
/// # Returns
///
/// Returns interpolated precision at 101 recall levels (0.0, 0.01, ..., 1.0).
pub fn interpolate_precision(precision: &[f64], recall: &[f64]) -> Vec<f64> {
    // Suffix maximum so each level reads the best precision at any recall >= it
    let mut envelope = precision.to_vec();
    for i in (0..envelope.len().saturating_sub(1)).rev() {
        envelope[i] = envelope[i].max(envelope[i + 1]);
    }

    (0..=100)
        .map(|i| {
            let recall_level = i as f64 / 100.0;
            // Recall is non-decreasing along the ranking
            let first = recall.partition_point(|&r| r < recall_level);
            envelope.get(first).copied().unwrap_or(0.0)
        })
        .collect()
}
