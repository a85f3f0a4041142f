//! Page instructions
//!
//! A page instruction picks one page out of one uploaded source and says how
//! much to turn it. The order of a list of instructions is the page order of
//! the composed document.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One page of the output document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInstruction {
    /// Name the source was uploaded under
    #[serde(rename = "sourceFile")]
    pub source_id: String,
    /// Zero-based page index within that source
    pub page_index: usize,
    /// Clockwise rotation in degrees, added to the page's current rotation
    #[serde(default)]
    pub rotation: i64,
}

impl PageInstruction {
    pub fn new(source_id: impl Into<String>, page_index: usize, rotation: i64) -> Self {
        Self {
            source_id: source_id.into(),
            page_index,
            rotation,
        }
    }

    /// Rotation must be a whole number of quarter turns (negative values allowed).
    pub fn validate_rotation(&self) -> Result<(), ValidationError> {
        if self.rotation % 90 != 0 {
            return Err(ValidationError::InvalidRotation(self.rotation));
        }
        Ok(())
    }
}

/// Which pages a request wants.
///
/// `AllPages` and an explicit empty list are different things: callers pick
/// one deliberately instead of letting an empty list mean "everything".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every page of every source, in upload order
    AllPages,
    /// Exactly these pages, in this order
    Pages(Vec<PageInstruction>),
}

/// Parse the JSON instruction array sent with a request.
///
/// `[{"sourceFile": "a.pdf", "pageIndex": 0, "rotation": 90}, ...]`
pub fn parse_instructions(json: &str) -> Result<Vec<PageInstruction>, ValidationError> {
    let instructions: Vec<PageInstruction> = serde_json::from_str(json)
        .map_err(|e| ValidationError::MalformedInstructions(e.to_string()))?;

    for instruction in &instructions {
        instruction.validate_rotation()?;
    }

    Ok(instructions)
}

/// Parse page range string like "1-3, 5, 8-10" into sorted unique 1-based page numbers.
///
/// Every page must fall within `1..=page_count`; bounds are checked before a range is expanded.
pub fn parse_ranges(input: &str, page_count: u32) -> Result<Vec<u32>, ValidationError> {
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| ValidationError::InvalidRange(format!("Invalid start: {}", start)))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| ValidationError::InvalidRange(format!("Invalid end: {}", end)))?;

            if start > end {
                return Err(ValidationError::InvalidRange(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }

            check_bound(end, page_count)?;
            pages.extend(start..=end);
        } else {
            let page: u32 = part
                .parse()
                .map_err(|_| ValidationError::InvalidRange(format!("Invalid page: {}", part)))?;
            check_bound(page, page_count)?;
            pages.insert(page);
        }
    }

    if pages.contains(&0) {
        return Err(ValidationError::InvalidRange(
            "Page numbers must be >= 1".into(),
        ));
    }

    Ok(pages.into_iter().collect())
}

fn check_bound(page: u32, page_count: u32) -> Result<(), ValidationError> {
    if page > page_count {
        return Err(ValidationError::InvalidRange(format!(
            "Page {} exceeds page count {}",
            page, page_count
        )));
    }
    Ok(())
}
