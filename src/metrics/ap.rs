//! AP over a ranked detection list and the mean over classes.

use crate::metrics::precision_recall::interpolate_precision;

/// AP of one class: mean of the 101 interpolated precisions at recall 0.00..=1.00.
///
/// `precisions` / `recalls` are the cumulative curve over the class's
/// predictions in ranking order (score descending), as returned by
/// [`build_precision_recall_curve`](crate::metrics::precision_recall::build_precision_recall_curve).
/// Recall levels past the last reached one contribute zero.
///
/// An empty curve gives 0.0. A class with no scorable ground truth has no
/// recall at all; callers report 0.0 for it before reaching this function and
/// keep it out of [`calculate_map`].
///
/// ```
/// use tide_eval::metrics::ap::calculate_ap;
/// use tide_eval::metrics::precision_recall::build_precision_recall_curve;
///
/// // hit, miss, hit against two positives
/// let (precisions, recalls) = build_precision_recall_curve(&[true, false, true], 2);
/// let ap = calculate_ap(&precisions, &recalls);
/// // recall 0.00..=0.50 at precision 1, 0.51..=1.00 at precision 2/3
/// let expected = (51.0 + 50.0 * 2.0 / 3.0) / 101.0;
/// assert!((ap - expected).abs() < 1e-10);
/// ```
pub fn calculate_ap(precisions: &[f64], recalls: &[f64]) -> f64 {
    if precisions.is_empty() || recalls.is_empty() {
        return 0.0;
    }

    let interpolated = interpolate_precision(precisions, recalls);
    interpolated.iter().sum::<f64>() / interpolated.len() as f64
}

/// Plain mean of per-class APs; 0.0 when no class qualifies.
///
/// The caller passes only classes that have at least one positive.
///
/// ```
/// use tide_eval::metrics::ap::calculate_map;
///
/// assert_eq!(calculate_map(&[]), 0.0);
/// assert!((calculate_map(&[1.0, 51.0 / 101.0]) - 152.0 / 202.0).abs() < 1e-10);
/// ```
pub fn calculate_map(class_aps: &[f64]) -> f64 {
    if class_aps.is_empty() {
        return 0.0;
    }

    class_aps.iter().sum::<f64>() / class_aps.len() as f64
}
