//! # tide-eval
//!
//! Error diagnosis for object detection, in the style of TIDE.
//!
//! Beyond a single mAP number, this library explains *why* a detector loses
//! AP. It matches predictions to ground truth, classifies every mistake into a
//! fixed taxonomy and measures how much mAP each kind of mistake costs:
//!
//! - **Cls**: right place, wrong class
//! - **Loc**: right class, poorly localized
//! - **Both**: wrong class and poorly localized
//! - **Dupe**: a correct detection of an object that was already detected
//! - **Bkg**: a detection on background
//! - **Miss**: a ground truth nobody detected
//!
//! ## Features
//!
//! - Box and run-length mask regions
//! - Greedy per-image, per-class matching with ignore regions
//! - 101-point interpolated AP per class and mAP
//! - mAP impact of fixing each error kind, or a single error
//! - Restriction of a finished run to any subset of annotations, and the
//!   dataset enlargement that makes re-evaluating a subset agree with it
//!
//! ## Quick Start
//!
//! ```rust
//! use tide_eval::{BoundingBox, DatasetBuilder, Region, Tide, TideConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let square = |x: f64| Region::Box(BoundingBox::new(x, 0.0, 10.0, 10.0));
//!
//! let mut gt = DatasetBuilder::new("gt");
//! gt.add_ground_truth(1, 1, square(0.0));
//! let mut preds = DatasetBuilder::new("pred");
//! preds.add_prediction(1, 1, square(0.0), 0.9);
//! preds.add_prediction(1, 1, square(1.0), 0.5);
//!
//! let mut tide = Tide::new(TideConfig::default())?;
//! let run = tide.evaluate(&gt.build()?, &preds.build()?, "demo")?;
//!
//! println!("mAP: {:.4}", run.get_map());
//! for error in run.errors() {
//!     println!("{}: {:?}", error.code(), error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod loader;
pub mod metrics;
pub mod matching;
pub mod diagnosis;
pub mod classifier;
pub mod ap_data;
pub mod evaluator;
pub mod restriction;

// Re-export commonly used types and functions
pub use error::{Result, TideError};
pub use types::{
    Annotation, BoundingBox, ClassIds, Dataset, DatasetBuilder, IdMap, ImageEntry, Region, Rle,
};
pub use config::TideConfig;
pub use loader::{load_from_file, load_from_string};
pub use diagnosis::{BestGtMatch, DetectionError, ErrorKind, Fix};
pub use classifier::Outcome;
pub use evaluator::{evaluate, Qualifiers, RestrictedView, Run, Tide};
pub use restriction::{create_filtered_data, enlarge_dataset, filter_dataset_to_label, FilteredPair};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_compiles() {
        // Basic smoke test to ensure the library compiles
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(bbox.is_valid());
        assert!(TideConfig::default().validate().is_ok());
    }
}
