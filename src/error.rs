//! Error types for the tide-eval library.
//!
//! These are operational failures only. Detection errors found by the
//! classifier are plain data, see [`crate::diagnosis`].

use thiserror::Error;

/// Result type for tide-eval operations.
pub type Result<T> = std::result::Result<T, TideError>;

/// Error types that can occur while building datasets, evaluating or restricting runs.
#[derive(Error, Debug)]
pub enum TideError {
    /// Error during JSON parsing or serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Annotation ids are not the dense range `0..n`.
    #[error("Dataset '{dataset}': annotation at position {position} has id {found}, expected {position}")]
    NonDenseIds {
        dataset: String,
        position: usize,
        found: usize,
    },

    /// An annotation references an image missing from the image table.
    #[error("Dataset '{dataset}': annotation {annotation} references unknown image {image_id}")]
    DanglingImage {
        dataset: String,
        annotation: usize,
        image_id: u64,
    },

    /// An annotation references a class missing from the class table.
    #[error("Dataset '{dataset}': annotation {annotation} references unknown class {class_id}")]
    DanglingClass {
        dataset: String,
        annotation: usize,
        class_id: u64,
    },

    /// The image table disagrees with the annotations it lists.
    #[error("Dataset '{dataset}': image {image_id} index is inconsistent: {reason}")]
    ImageIndexMismatch {
        dataset: String,
        image_id: u64,
        reason: String,
    },

    /// A prediction carries no confidence score.
    #[error("Dataset '{dataset}': prediction {annotation} has no score")]
    MissingScore { dataset: String, annotation: usize },

    /// Two regions cannot be compared (box vs mask, or masks of different size).
    #[error("Region mismatch: {0}")]
    RegionMismatch(String),

    /// An ingested record lacks a field its role requires.
    #[error("Invalid record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// Invalid bounding box coordinates.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Ground truth and predictions disagree on a class name.
    #[error("Category mismatch: {0}")]
    CategoryMismatch(String),

    /// Ground truth and predictions disagree on an image name.
    #[error("Image mismatch: {0}")]
    ImageMismatch(String),

    /// Invalid matching threshold.
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// An id passed to a restriction does not exist in the evaluated dataset.
    #[error("{operation}: {side} annotation {id} does not exist (dataset has {len})")]
    UnknownAnnotation {
        operation: &'static str,
        side: &'static str,
        id: usize,
        len: usize,
    },

    /// An id passed to a restriction is filed under the wrong class.
    #[error("{operation}: {side} annotation {id} has class {actual}, requested under class {requested}")]
    ClassMismatch {
        operation: &'static str,
        side: &'static str,
        id: usize,
        actual: u64,
        requested: u64,
    },

    /// The run used for enlargement was not computed on the given datasets.
    #[error("{operation}: run '{run}' was not evaluated on these datasets: {reason}")]
    RunMismatch {
        operation: &'static str,
        run: String,
        reason: String,
    },

    /// No run with this name has been evaluated.
    #[error("Unknown run: {0}")]
    UnknownRun(String),
}
