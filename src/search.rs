//! Size-targeted preset search
//!
//! Image recompression has no closed-form inverse: there is no way to compute
//! the DPI and quality pair that lands on a given byte count. The search
//! therefore tries the presets of a [`PresetLadder`] from weakest to
//! strongest and keeps the first result that fits.
//!
//! Every attempt starts again from the untouched document. Recompressing an
//! already recompressed copy compounds the loss of each pass.

use crate::error::PdfError;
use crate::preset::{BudgetFit, CompressionPreset, PresetLadder, SizeBudget};
use crate::recompress::{ImageRecompressor, RecompressReport};
use crate::writer::DocumentWriter;
use lopdf::Document;
use log::{debug, info, warn};

/// One preset tried by the search
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub preset: CompressionPreset,
    pub size: u64,
    pub fit: BudgetFit,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub bytes: Vec<u8>,
    /// Preset behind `bytes`; `None` when the unmodified document is returned
    pub preset: Option<CompressionPreset>,
    /// False when no preset reached `max_bytes`
    pub budget_met: bool,
    pub fit: BudgetFit,
    /// Serialized size of the unmodified document
    pub original_size: u64,
    pub attempts: Vec<Attempt>,
    /// Recompression report of the returned preset, if one was applied
    pub report: Option<RecompressReport>,
}

impl SearchOutcome {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct SizeTargetSearch {
    ladder: PresetLadder,
    writer: DocumentWriter,
    min_dpi: f32,
}

impl SizeTargetSearch {
    pub fn new(ladder: PresetLadder, writer: DocumentWriter) -> Self {
        Self {
            ladder,
            writer,
            min_dpi: 0.0,
        }
    }

    pub fn with_min_dpi(mut self, min_dpi: f32) -> Self {
        self.min_dpi = min_dpi;
        self
    }

    pub fn ladder(&self) -> &PresetLadder {
        &self.ladder
    }

    /// Find the weakest preset whose output fits `budget`.
    ///
    /// An unreachable budget is not an error: the strongest result comes
    /// back with `budget_met == false`. The result is never larger than the
    /// unmodified document.
    pub fn run(&self, doc: &Document, budget: &SizeBudget) -> Result<SearchOutcome, PdfError> {
        let baseline = self.writer.write(&mut doc.clone())?;
        let original_size = baseline.len() as u64;

        if budget.is_met(original_size) {
            info!(
                "Document already fits the budget ({} <= {} bytes), leaving it unmodified",
                original_size, budget.max_bytes
            );
            return Ok(SearchOutcome {
                bytes: baseline,
                preset: None,
                budget_met: true,
                fit: budget.fit(original_size),
                original_size,
                attempts: Vec::new(),
                report: None,
            });
        }

        let mut attempts = Vec::with_capacity(self.ladder.len());
        let mut last: Option<(Vec<u8>, CompressionPreset, RecompressReport)> = None;

        for &preset in self.ladder.presets() {
            let mut candidate = doc.clone();
            let report = ImageRecompressor::new(preset)
                .with_min_dpi(self.min_dpi)
                .recompress(&mut candidate);
            let bytes = self.writer.write(&mut candidate)?;
            let size = bytes.len() as u64;
            let fit = budget.fit(size);

            debug!(
                "Preset {} DPI / quality {}: {} bytes ({:?})",
                preset.target_dpi, preset.jpeg_quality, size, fit
            );
            attempts.push(Attempt { preset, size, fit });

            if fit != BudgetFit::Over {
                if fit == BudgetFit::Under {
                    debug!(
                        "Preset lands under the acceptable range ({} < {:?}), accepting",
                        size, budget.min_bytes
                    );
                }
                info!(
                    "Reached {} bytes with {} DPI / quality {} after {} attempts",
                    size,
                    preset.target_dpi,
                    preset.jpeg_quality,
                    attempts.len()
                );
                return Ok(SearchOutcome {
                    bytes,
                    preset: Some(preset),
                    budget_met: true,
                    fit,
                    original_size,
                    attempts,
                    report: Some(report),
                });
            }

            last = Some((bytes, preset, report));
        }

        match last {
            Some((bytes, preset, report)) if bytes.len() as u64 <= original_size => {
                warn!(
                    "Budget of {} bytes not met; strongest preset gives {} bytes",
                    budget.max_bytes,
                    bytes.len()
                );
                let fit = budget.fit(bytes.len() as u64);
                Ok(SearchOutcome {
                    bytes,
                    preset: Some(preset),
                    budget_met: false,
                    fit,
                    original_size,
                    attempts,
                    report: Some(report),
                })
            }
            _ => {
                warn!(
                    "Budget of {} bytes not met and recompression did not shrink the document; returning it unmodified",
                    budget.max_bytes
                );
                Ok(SearchOutcome {
                    bytes: baseline,
                    preset: None,
                    budget_met: false,
                    fit: BudgetFit::Over,
                    original_size,
                    attempts,
                    report: None,
                })
            }
        }
    }
}
