use crate::error::PdfError;
use crate::preset::QualityTable;
use crate::source::CorruptSourcePolicy;
use crate::writer::WriteOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine settings shared by every request operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub write: WriteOptions,
    /// What to do when an uploaded file cannot be opened
    pub source_policy: CorruptSourcePolicy,
    /// Quality dial thresholds; read weakest first, also the size-search ladder
    pub quality_table: QualityTable,
    /// Lower edge of the acceptable size range, as a fraction of the target
    pub size_range_floor: f32,
    /// Images at or below this effective DPI are never downsampled
    pub min_dpi: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write: WriteOptions::default(),
            source_policy: CorruptSourcePolicy::default(),
            quality_table: QualityTable::default(),
            size_range_floor: 0.8,
            min_dpi: 0.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, PdfError> {
        serde_json::from_str(json).map_err(|e| PdfError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PdfError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
