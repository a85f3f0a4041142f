//! Compression presets and the dials that select them

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Resolution and encoder quality for one recompression pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionPreset {
    /// Images are downsampled to at most this many pixels per inch of page
    #[serde(rename = "targetDPI")]
    pub target_dpi: u32,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl CompressionPreset {
    pub const fn new(target_dpi: u32, jpeg_quality: u8) -> Self {
        Self {
            target_dpi,
            jpeg_quality,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ValidationError::InvalidPresetLadder(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.target_dpi == 0 {
            return Err(ValidationError::InvalidPresetLadder(
                "target DPI must be positive".into(),
            ));
        }
        Ok(())
    }

    /// True when `self` is at least as aggressive as `other` on both axes
    fn at_least_as_strong_as(&self, other: &CompressionPreset) -> bool {
        self.target_dpi <= other.target_dpi && self.jpeg_quality <= other.jpeg_quality
    }
}

/// One row of the quality table: dial values at or above `min_quality` use `preset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityTier {
    pub min_quality: u8,
    pub label: TierLabel,
    pub preset: CompressionPreset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierLabel {
    HighQuality,
    GoodQuality,
    Balanced,
    MediumCompression,
    HighCompression,
}

/// Ordered presets, weakest (largest output) first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CompressionPreset>", into = "Vec<CompressionPreset>")]
pub struct PresetLadder {
    presets: Vec<CompressionPreset>,
}

impl PresetLadder {
    /// Each preset must be at least as strong as the one before it.
    pub fn new(presets: Vec<CompressionPreset>) -> Result<Self, ValidationError> {
        if presets.is_empty() {
            return Err(ValidationError::InvalidPresetLadder(
                "ladder has no presets".into(),
            ));
        }
        for preset in &presets {
            preset.validate()?;
        }
        for pair in presets.windows(2) {
            if !pair[1].at_least_as_strong_as(&pair[0]) {
                return Err(ValidationError::InvalidPresetLadder(format!(
                    "{:?} is weaker than the preset before it ({:?})",
                    pair[1], pair[0]
                )));
            }
        }
        Ok(Self { presets })
    }

    pub fn presets(&self) -> &[CompressionPreset] {
        &self.presets
    }

    pub fn strongest(&self) -> CompressionPreset {
        self.presets[self.presets.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl TryFrom<Vec<CompressionPreset>> for PresetLadder {
    type Error = ValidationError;

    fn try_from(presets: Vec<CompressionPreset>) -> Result<Self, Self::Error> {
        PresetLadder::new(presets)
    }
}

impl From<PresetLadder> for Vec<CompressionPreset> {
    fn from(ladder: PresetLadder) -> Self {
        ladder.presets
    }
}

/// Maps the 0-100 quality dial onto presets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<QualityTier>", into = "Vec<QualityTier>")]
pub struct QualityTable {
    /// Sorted by `min_quality`, highest first; the last tier starts at 0
    tiers: Vec<QualityTier>,
}

impl QualityTable {
    pub fn new(mut tiers: Vec<QualityTier>) -> Result<Self, ValidationError> {
        tiers.sort_by(|a, b| b.min_quality.cmp(&a.min_quality));

        match tiers.last() {
            Some(tier) if tier.min_quality == 0 => {}
            _ => {
                return Err(ValidationError::InvalidPresetLadder(
                    "quality table must have a tier starting at 0".into(),
                ))
            }
        }

        // Validates presets and monotonicity
        PresetLadder::new(tiers.iter().map(|t| t.preset).collect())?;

        Ok(Self { tiers })
    }

    /// Preset for a dial position
    pub fn preset_for(&self, quality: Quality) -> CompressionPreset {
        self.tier_for(quality).preset
    }

    pub fn tier_for(&self, quality: Quality) -> &QualityTier {
        let percent = quality.percent();
        self.tiers
            .iter()
            .find(|tier| percent >= tier.min_quality)
            .unwrap_or(&self.tiers[self.tiers.len() - 1])
    }

    /// Every preset of the table, weakest first
    pub fn ladder(&self) -> PresetLadder {
        PresetLadder {
            presets: self.tiers.iter().map(|t| t.preset).collect(),
        }
    }

    pub fn tiers(&self) -> &[QualityTier] {
        &self.tiers
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        let tier = |min_quality: u8, label: TierLabel, dpi: u32, jpeg: u8| QualityTier {
            min_quality,
            label,
            preset: CompressionPreset::new(dpi, jpeg),
        };
        Self {
            tiers: vec![
                tier(80, TierLabel::HighQuality, 300, 95),
                tier(60, TierLabel::GoodQuality, 200, 85),
                tier(40, TierLabel::Balanced, 150, 75),
                tier(20, TierLabel::MediumCompression, 100, 65),
                tier(0, TierLabel::HighCompression, 72, 50),
            ],
        }
    }
}

impl TryFrom<Vec<QualityTier>> for QualityTable {
    type Error = ValidationError;

    fn try_from(tiers: Vec<QualityTier>) -> Result<Self, Self::Error> {
        QualityTable::new(tiers)
    }
}

impl From<QualityTable> for Vec<QualityTier> {
    fn from(table: QualityTable) -> Self {
        table.tiers
    }
}

/// Position of the quality dial, 0 (smallest) to 100 (best looking)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub fn from_percent(percent: u8) -> Result<Self, ValidationError> {
        if percent > 100 {
            return Err(ValidationError::InvalidQuality(percent.to_string()));
        }
        Ok(Self(percent))
    }

    pub fn from_fraction(fraction: f32) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ValidationError::InvalidQuality(fraction.to_string()));
        }
        Ok(Self((fraction * 100.0).round() as u8))
    }

    /// Accept either scale: `[0.0, 1.0]` is a fraction (so `1` is 100%),
    /// `(1.0, 100.0]` is a percentage.
    pub fn parse(value: f64) -> Result<Self, ValidationError> {
        if value.is_nan() || !(0.0..=100.0).contains(&value) {
            return Err(ValidationError::InvalidQuality(value.to_string()));
        }
        if value <= 1.0 {
            Self::from_fraction(value as f32)
        } else {
            Ok(Self(value.round() as u8))
        }
    }

    pub fn percent(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    #[serde(rename = "KB", alias = "kb")]
    Kilobytes,
    #[serde(rename = "MB", alias = "mb")]
    Megabytes,
}

impl SizeUnit {
    pub fn bytes(&self) -> u64 {
        match self {
            SizeUnit::Kilobytes => 1024,
            SizeUnit::Megabytes => 1024 * 1024,
        }
    }
}

/// Requested output size as sent by clients: `{"targetSize": 500, "unit": "KB"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSize {
    pub target_size: u64,
    pub unit: SizeUnit,
}

impl TargetSize {
    pub fn new(target_size: u64, unit: SizeUnit) -> Self {
        Self { target_size, unit }
    }

    pub fn to_bytes(&self) -> Result<u64, ValidationError> {
        if self.target_size == 0 {
            return Err(ValidationError::InvalidTargetSize(
                "target size must be positive".into(),
            ));
        }
        self.target_size
            .checked_mul(self.unit.bytes())
            .ok_or_else(|| ValidationError::InvalidTargetSize("target size overflows".into()))
    }

    /// Budget with an acceptable range starting at `floor * maxBytes`
    pub fn to_budget(&self, floor: f32) -> Result<SizeBudget, ValidationError> {
        let max_bytes = self.to_bytes()?;
        Ok(SizeBudget::with_range(
            (max_bytes as f64 * floor.clamp(0.0, 1.0) as f64) as u64,
            max_bytes,
        ))
    }
}

/// Output size constraint for the size-targeted search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    pub max_bytes: u64,
    pub min_bytes: Option<u64>,
}

/// Where a size lands relative to a budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetFit {
    /// Inside the acceptable range
    Within,
    /// Under `min_bytes`: meets the budget but compressed harder than asked
    Under,
    /// Over `max_bytes`
    Over,
}

impl SizeBudget {
    pub fn max(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            min_bytes: None,
        }
    }

    pub fn with_range(min_bytes: u64, max_bytes: u64) -> Self {
        Self {
            max_bytes,
            min_bytes: Some(min_bytes.min(max_bytes)),
        }
    }

    pub fn fit(&self, size: u64) -> BudgetFit {
        if size > self.max_bytes {
            BudgetFit::Over
        } else if self.min_bytes.is_some_and(|min| size < min) {
            BudgetFit::Under
        } else {
            BudgetFit::Within
        }
    }

    pub fn is_met(&self, size: u64) -> bool {
        size <= self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn preset(q: u8) -> CompressionPreset {
        QualityTable::default().preset_for(Quality::from_percent(q).unwrap())
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(preset(100), CompressionPreset::new(300, 95));
        assert_eq!(preset(80), CompressionPreset::new(300, 95));
        assert_eq!(preset(79), CompressionPreset::new(200, 85));
        assert_eq!(preset(60), CompressionPreset::new(200, 85));
        assert_eq!(preset(40), CompressionPreset::new(150, 75));
        assert_eq!(preset(20), CompressionPreset::new(100, 65));
        assert_eq!(preset(19), CompressionPreset::new(72, 50));
        assert_eq!(preset(0), CompressionPreset::new(72, 50));
    }

    #[test]
    fn test_quality_mapping_is_monotonic() {
        let table = QualityTable::default();
        let mut previous = table.preset_for(Quality::from_percent(0).unwrap());
        for q in 1..=100 {
            let current = table.preset_for(Quality::from_percent(q).unwrap());
            assert!(previous.at_least_as_strong_as(&current));
            previous = current;
        }
    }

    #[test]
    fn test_default_ladder_runs_weakest_to_strongest() {
        let ladder = QualityTable::default().ladder();
        assert_eq!(ladder.len(), 5);
        assert_eq!(ladder.presets()[0], CompressionPreset::new(300, 95));
        assert_eq!(ladder.strongest(), CompressionPreset::new(72, 50));
    }

    #[test]
    fn test_ladder_rejects_weaker_step() {
        let err = PresetLadder::new(vec![
            CompressionPreset::new(150, 75),
            CompressionPreset::new(200, 60),
        ])
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPresetLadder(_)));
        assert!(PresetLadder::new(vec![]).is_err());
        assert!(PresetLadder::new(vec![CompressionPreset::new(150, 0)]).is_err());
    }

    #[test]
    fn test_ladder_deserializes_with_validation() {
        let ladder: PresetLadder =
            serde_json::from_str(r#"[{"targetDPI":150,"jpegQuality":80},{"targetDPI":96,"jpegQuality":60}]"#)
                .unwrap();
        assert_eq!(ladder.strongest(), CompressionPreset::new(96, 60));

        let bad: Result<PresetLadder, _> =
            serde_json::from_str(r#"[{"targetDPI":96,"jpegQuality":60},{"targetDPI":150,"jpegQuality":80}]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_quality_table_requires_zero_tier() {
        let err = QualityTable::new(vec![QualityTier {
            min_quality: 50,
            label: TierLabel::Balanced,
            preset: CompressionPreset::new(150, 75),
        }])
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPresetLadder(_)));
    }

    #[test]
    fn test_quality_parse_accepts_both_scales() {
        assert_eq!(Quality::parse(0.5).unwrap().percent(), 50);
        assert_eq!(Quality::parse(1.0).unwrap().percent(), 100);
        assert_eq!(Quality::parse(0.0).unwrap().percent(), 0);
        assert_eq!(Quality::parse(75.0).unwrap().percent(), 75);
        assert!(Quality::parse(101.0).is_err());
        assert!(Quality::parse(-0.1).is_err());
        assert!(Quality::parse(f64::NAN).is_err());
        assert!(Quality::from_percent(101).is_err());
    }

    #[test]
    fn test_target_size_normalizes_units() {
        assert_eq!(TargetSize::new(500, SizeUnit::Kilobytes).to_bytes().unwrap(), 512_000);
        assert_eq!(TargetSize::new(2, SizeUnit::Megabytes).to_bytes().unwrap(), 2_097_152);
        assert!(TargetSize::new(0, SizeUnit::Kilobytes).to_bytes().is_err());
    }

    #[test]
    fn test_target_size_deserializes() {
        let target: TargetSize = serde_json::from_str(r#"{"targetSize":3,"unit":"MB"}"#).unwrap();
        assert_eq!(target, TargetSize::new(3, SizeUnit::Megabytes));
    }

    #[test]
    fn test_budget_range() {
        let budget = TargetSize::new(100, SizeUnit::Kilobytes).to_budget(0.8).unwrap();
        assert_eq!(budget.max_bytes, 102_400);
        assert_eq!(budget.min_bytes, Some(81_920));
        assert_eq!(budget.fit(90_000), BudgetFit::Within);
        assert_eq!(budget.fit(50_000), BudgetFit::Under);
        assert_eq!(budget.fit(102_401), BudgetFit::Over);
        assert!(budget.is_met(50_000));
    }
}
