//! Core data types: regions, annotations and datasets.

use crate::error::{Result, TideError};
use crate::metrics::iou::calculate_iou;
use crate::metrics::mask::mask_iou;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Table from a re-indexed annotation id to the id it had in the source dataset.
pub type IdMap = BTreeMap<usize, usize>;

/// Class id to the set of annotation ids filed under it.
pub type ClassIds = BTreeMap<u64, BTreeSet<usize>>;

/// Represents a bounding box in COCO format (x, y, width, height).
///
/// Coordinates are in LTWH (Left-Top-Width-Height) format where:
/// - x: Left coordinate
/// - y: Top coordinate
/// - width: Box width
/// - height: Box height
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build a box from an `[x, y, w, h]` slice.
    pub fn from_xywh(values: &[f64]) -> Result<Self> {
        if values.len() != 4 {
            return Err(TideError::InvalidBoundingBox(format!(
                "Expected 4 values, got {}",
                values.len()
            )));
        }
        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    /// Get the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Get the right coordinate (x + width).
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Get the bottom coordinate (y + height).
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Check if the bounding box is valid (positive dimensions).
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Column-major run-length encoded binary mask.
///
/// Runs alternate starting with background: `counts[0]` zeros, `counts[1]` ones, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    pub counts: Vec<u32>,
}

impl Rle {
    pub fn new(h: u32, w: u32, counts: Vec<u32>) -> Self {
        Self { h, w, counts }
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.counts
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&c| c as u64)
            .sum()
    }

    /// Total pixels covered by the runs.
    pub fn covered(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Spatial extent of an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Box(BoundingBox),
    Mask(Rle),
}

impl Region {
    /// Intersection over union with another region of the same kind.
    pub fn iou(&self, other: &Region) -> Result<f64> {
        match (self, other) {
            (Region::Box(a), Region::Box(b)) => Ok(calculate_iou(a, b)),
            (Region::Mask(a), Region::Mask(b)) => mask_iou(a, b),
            _ => Err(TideError::RegionMismatch(
                "cannot compare a box with a mask".to_string(),
            )),
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        match self {
            Region::Box(b) => {
                let finite = [b.x, b.y, b.width, b.height].iter().all(|v| v.is_finite());
                if !finite || b.width < 0.0 || b.height < 0.0 {
                    return Err(format!("box {:?} has non-finite or negative dimensions", b));
                }
            }
            Region::Mask(m) => {
                let expected = m.h as u64 * m.w as u64;
                if m.covered() != expected {
                    return Err(format!(
                        "mask runs cover {} pixels, expected {}x{}",
                        m.covered(),
                        m.h,
                        m.w
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One ground-truth region or one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Dense id, equal to the position in the owning dataset.
    pub id: usize,
    pub image_id: u64,
    pub class_id: u64,
    pub region: Region,
    /// Occupies space during matching but is never scored.
    #[serde(default)]
    pub ignore: bool,
    /// Confidence score (predictions only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f64>,
    /// Ground truth id this prediction was scored against (true positives only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub matched_with: Option<usize>,
}

/// An image and the annotations that belong to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub name: String,
    pub annotation_ids: Vec<usize>,
}

/// Immutable collection of annotations with their class and image tables.
///
/// Annotation ids always form the dense range `0..len()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    name: String,
    annotations: Vec<Annotation>,
    classes: BTreeMap<u64, String>,
    images: BTreeMap<u64, ImageEntry>,
}

impl Dataset {
    /// Assemble a dataset from ingested tables, validating every cross reference.
    pub fn from_parts(
        name: impl Into<String>,
        annotations: Vec<Annotation>,
        classes: BTreeMap<u64, String>,
        images: BTreeMap<u64, ImageEntry>,
    ) -> Result<Self> {
        let dataset = Self {
            name: name.into(),
            annotations,
            classes,
            images,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check id density and the image/class references.
    pub fn validate(&self) -> Result<()> {
        for (position, ann) in self.annotations.iter().enumerate() {
            if ann.id != position {
                return Err(TideError::NonDenseIds {
                    dataset: self.name.clone(),
                    position,
                    found: ann.id,
                });
            }
            if !self.classes.contains_key(&ann.class_id) {
                return Err(TideError::DanglingClass {
                    dataset: self.name.clone(),
                    annotation: ann.id,
                    class_id: ann.class_id,
                });
            }
            let image = self
                .images
                .get(&ann.image_id)
                .ok_or_else(|| TideError::DanglingImage {
                    dataset: self.name.clone(),
                    annotation: ann.id,
                    image_id: ann.image_id,
                })?;
            if !image.annotation_ids.contains(&ann.id) {
                return Err(TideError::ImageIndexMismatch {
                    dataset: self.name.clone(),
                    image_id: ann.image_id,
                    reason: format!("annotation {} is not listed", ann.id),
                });
            }
            ann.region.check().map_err(|reason| {
                TideError::InvalidBoundingBox(format!(
                    "dataset '{}', annotation {}: {}",
                    self.name, ann.id, reason
                ))
            })?;
        }

        let mut seen = BTreeSet::new();
        for (&image_id, image) in &self.images {
            for &id in &image.annotation_ids {
                let belongs = self
                    .annotations
                    .get(id)
                    .is_some_and(|ann| ann.image_id == image_id);
                if !belongs || !seen.insert(id) {
                    return Err(TideError::ImageIndexMismatch {
                        dataset: self.name.clone(),
                        image_id,
                        reason: format!("lists annotation {} that does not belong to it", id),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: usize) -> Option<&Annotation> {
        self.annotations.get(id)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn classes(&self) -> &BTreeMap<u64, String> {
        &self.classes
    }

    pub fn images(&self) -> &BTreeMap<u64, ImageEntry> {
        &self.images
    }

    /// Annotation ids of one image, empty if the image is unknown.
    pub fn image_annotations(&self, image_id: u64) -> &[usize] {
        self.images
            .get(&image_id)
            .map(|image| image.annotation_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Group annotation ids by class.
    pub fn ids_by_class(&self) -> ClassIds {
        let mut by_class = ClassIds::new();
        for ann in &self.annotations {
            by_class.entry(ann.class_id).or_default().insert(ann.id);
        }
        by_class
    }

    /// Copy of this dataset with `matched_with` replaced for every annotation.
    pub(crate) fn with_matches(&self, matches: impl Fn(usize) -> Option<usize>) -> Self {
        let mut copy = self.clone();
        for ann in &mut copy.annotations {
            ann.matched_with = matches(ann.id);
        }
        copy
    }
}

/// Incrementally builds a [`Dataset`], assigning dense ids at insertion.
///
/// Images and classes referenced by an annotation are registered with a
/// default name (`"Image {id}"`, `"Class {id}"`) unless added explicitly first.
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    name: String,
    annotations: Vec<Annotation>,
    classes: BTreeMap<u64, String>,
    images: BTreeMap<u64, ImageEntry>,
}

impl DatasetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_class(&mut self, class_id: u64, name: impl Into<String>) -> &mut Self {
        self.classes.insert(class_id, name.into());
        self
    }

    pub fn add_image(&mut self, image_id: u64, name: impl Into<String>) -> &mut Self {
        self.images
            .entry(image_id)
            .or_insert_with(|| ImageEntry {
                name: String::new(),
                annotation_ids: Vec::new(),
            })
            .name = name.into();
        self
    }

    /// Add a scored ground truth region, returning its id.
    pub fn add_ground_truth(&mut self, image_id: u64, class_id: u64, region: Region) -> usize {
        self.push(image_id, class_id, region, false, None)
    }

    /// Add a crowd / unannotated region that must not be scored.
    pub fn add_ignored_ground_truth(
        &mut self,
        image_id: u64,
        class_id: u64,
        region: Region,
    ) -> usize {
        self.push(image_id, class_id, region, true, None)
    }

    /// Add a prediction with its confidence, returning its id.
    pub fn add_prediction(
        &mut self,
        image_id: u64,
        class_id: u64,
        region: Region,
        score: f64,
    ) -> usize {
        self.push(image_id, class_id, region, false, Some(score))
    }

    fn push(
        &mut self,
        image_id: u64,
        class_id: u64,
        region: Region,
        ignore: bool,
        score: Option<f64>,
    ) -> usize {
        let id = self.annotations.len();
        self.classes
            .entry(class_id)
            .or_insert_with(|| format!("Class {}", class_id));
        self.images
            .entry(image_id)
            .or_insert_with(|| ImageEntry {
                name: format!("Image {}", image_id),
                annotation_ids: Vec::new(),
            })
            .annotation_ids
            .push(id);
        self.annotations.push(Annotation {
            id,
            image_id,
            class_id,
            region,
            ignore,
            score,
            matched_with: None,
        });
        id
    }

    pub fn build(self) -> Result<Dataset> {
        Dataset::from_parts(self.name, self.annotations, self.classes, self.images)
    }
}
