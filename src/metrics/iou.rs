//! Box overlap.

use crate::types::BoundingBox;

/// Calculate the Intersection over Union (IoU) between two LTWH boxes.
///
/// Boxes that only touch, and degenerate boxes, have an IoU of 0.0.
///
/// # Example
///
/// ```
/// use tide_eval::metrics::iou::calculate_iou;
/// use tide_eval::types::BoundingBox;
///
/// let bbox1 = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let bbox2 = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
/// let iou = calculate_iou(&bbox1, &bbox2);
/// assert!((iou - 1.0 / 3.0).abs() < 1e-10);
/// ```
pub fn calculate_iou(bbox1: &BoundingBox, bbox2: &BoundingBox) -> f64 {
    let overlap_w = (bbox1.right().min(bbox2.right()) - bbox1.x.max(bbox2.x)).max(0.0);
    let overlap_h = (bbox1.bottom().min(bbox2.bottom()) - bbox1.y.max(bbox2.y)).max(0.0);
    let intersection = overlap_w * overlap_h;

    let union = bbox1.area() + bbox2.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}
