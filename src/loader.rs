//! JSON loading of flat box records into a (ground truth, predictions) pair.

use crate::error::{Result, TideError};
use crate::types::{BoundingBox, Dataset, DatasetBuilder, Region};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One row of a box table.
///
/// A row can be a ground truth (`is_gold`, class in `gold`), a prediction
/// (`is_pred`, class in `pred`, score in `confidence`), or both.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxRecord {
    pub image_id: u64,
    pub bbox_xywh: Vec<f64>,
    #[serde(default)]
    pub is_gold: bool,
    #[serde(default)]
    pub is_pred: bool,
    #[serde(default)]
    pub gold: Option<u64>,
    #[serde(default)]
    pub pred: Option<u64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Load a (ground truth, predictions) pair from a JSON file of box records.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a record is
/// missing the class or score its role needs.
///
/// # Example
///
/// ```no_run
/// use tide_eval::loader::load_from_file;
///
/// let (gts, preds) = load_from_file("boxes.json").unwrap();
/// println!("{} ground truths, {} predictions", gts.len(), preds.len());
/// ```
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<(Dataset, Dataset)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let records: Vec<BoxRecord> = serde_json::from_reader(reader)?;
    from_records(&records)
}

/// Load a (ground truth, predictions) pair from a JSON string.
///
/// # Example
///
/// ```
/// use tide_eval::loader::load_from_string;
///
/// let json = r#"[
///     {"image_id": 1, "bbox_xywh": [0, 0, 10, 10], "is_gold": true, "gold": 3},
///     {"image_id": 1, "bbox_xywh": [0, 0, 10, 10], "is_pred": true, "pred": 3, "confidence": 0.8}
/// ]"#;
/// let (gts, preds) = load_from_string(json).unwrap();
/// assert_eq!(gts.classes()[&3], "Class 3");
/// assert_eq!(preds.get(0).unwrap().score, Some(0.8));
/// ```
pub fn load_from_string(json_str: &str) -> Result<(Dataset, Dataset)> {
    let records: Vec<BoxRecord> = serde_json::from_str(json_str)?;
    from_records(&records)
}

/// Split records into ground truth and predictions, assigning dense ids in
/// record order.
pub fn from_records(records: &[BoxRecord]) -> Result<(Dataset, Dataset)> {
    let mut gts = DatasetBuilder::new("gt");
    let mut preds = DatasetBuilder::new("pred");

    for (index, record) in records.iter().enumerate() {
        let missing = |field: &str| TideError::InvalidRecord {
            index,
            reason: format!("missing '{}'", field),
        };
        let region = Region::Box(BoundingBox::from_xywh(&record.bbox_xywh)?);

        if record.is_gold {
            let class_id = record.gold.ok_or_else(|| missing("gold"))?;
            gts.add_ground_truth(record.image_id, class_id, region.clone());
        }
        if record.is_pred {
            let class_id = record.pred.ok_or_else(|| missing("pred"))?;
            let score = record.confidence.ok_or_else(|| missing("confidence"))?;
            preds.add_prediction(record.image_id, class_id, region, score);
        }
    }

    let (gts, preds) = (gts.build()?, preds.build()?);
    log::debug!(
        "loaded {} ground truths and {} predictions from {} records",
        gts.len(),
        preds.len(),
        records.len()
    );
    Ok((gts, preds))
}
