//! Metrics calculation modules: region overlap and average precision.

pub mod iou;
pub mod mask;
pub mod ap;
pub mod precision_recall;

pub use iou::calculate_iou;
pub use mask::mask_iou;
pub use ap::{calculate_ap, calculate_map};
pub use precision_recall::{build_precision_recall_curve, interpolate_precision};
