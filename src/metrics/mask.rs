//! Overlap of run-length encoded masks.

use crate::error::{Result, TideError};
use crate::types::Rle;

/// Number of pixels set in both masks.
///
/// Walks both run sequences in lockstep, so neither mask is decoded.
pub fn intersection_area(a: &Rle, b: &Rle) -> u64 {
    let (mut ai, mut bi) = (0usize, 0usize);
    let (mut ca, mut cb) = (0u64, 0u64);
    let (mut va, mut vb) = (false, false);
    let mut intersection = 0u64;

    loop {
        while ca == 0 {
            let Some(&c) = a.counts.get(ai) else {
                return intersection;
            };
            ca = c as u64;
            va = ai % 2 == 1;
            ai += 1;
        }
        while cb == 0 {
            let Some(&c) = b.counts.get(bi) else {
                return intersection;
            };
            cb = c as u64;
            vb = bi % 2 == 1;
            bi += 1;
        }

        let step = ca.min(cb);
        if va && vb {
            intersection += step;
        }
        ca -= step;
        cb -= step;
    }
}

/// Calculate the Intersection over Union between two masks of the same size.
///
/// # Errors
///
/// Returns [`TideError::RegionMismatch`] if the masks have different dimensions.
///
/// # Example
///
/// ```
/// use tide_eval::metrics::mask::mask_iou;
/// use tide_eval::types::Rle;
///
/// // 2x2 masks: left column vs top row
/// let left = Rle::new(2, 2, vec![0, 2, 2]);
/// let top = Rle::new(2, 2, vec![0, 1, 1, 1, 1]);
/// let iou = mask_iou(&left, &top).unwrap();
/// assert!((iou - 1.0 / 3.0).abs() < 1e-10);
/// ```
pub fn mask_iou(a: &Rle, b: &Rle) -> Result<f64> {
    if a.h != b.h || a.w != b.w {
        return Err(TideError::RegionMismatch(format!(
            "mask sizes differ: {}x{} vs {}x{}",
            a.h, a.w, b.h, b.w
        )));
    }

    let intersection = intersection_area(a, b);
    let union = a.area() + b.area() - intersection;
    if union == 0 {
        return Ok(0.0);
    }
    Ok(intersection as f64 / union as f64)
}
