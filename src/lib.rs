//! PDF page composition and image recompression
//!
//! Builds new documents from ordered page instructions drawn from one or
//! more uploaded PDFs, and shrinks documents by recompressing their raster
//! images, either at a fixed quality or by searching for the weakest preset
//! that meets a size budget.
//!
//! Every request runs the same pipeline: open the sources, compose, then
//! optionally recompress, then serialize.

pub mod archive;
pub mod codec;
pub mod compose;
pub mod config;
pub mod error;
pub mod file_ops;
pub mod instruction;
pub mod preset;
pub mod recompress;
pub mod scanner;
pub mod search;
pub mod source;
pub mod split;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use compose::PageInstructionCompiler;
pub use config::EngineConfig;
pub use error::{PdfError, ValidationError};
pub use instruction::{parse_instructions, parse_ranges, PageInstruction, Selection};
pub use preset::{
    BudgetFit, CompressionPreset, PresetLadder, Quality, QualityTable, SizeBudget, SizeUnit, TargetSize,
};
pub use recompress::{ImageRecompressor, RecompressReport};
pub use search::{Attempt, SearchOutcome, SizeTargetSearch};
pub use source::{CorruptSourcePolicy, SkippedSource, SourceSet};
pub use split::SplitRequest;
pub use writer::{DocumentWriter, WriteOptions};

use lopdf::Document;
use log::{info, warn};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    Zip,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Pdf => "application/pdf",
            ContentType::Zip => "application/zip",
        }
    }
}

/// A finished result ready to hand back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
    /// Suggested download name
    pub file_name: String,
}

impl Artifact {
    pub fn pdf(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: ContentType::Pdf,
            file_name: file_name.into(),
        }
    }

    pub fn zip(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: ContentType::Zip,
            file_name: file_name.into(),
        }
    }
}

/// Result of a compression request
#[derive(Debug, Clone)]
pub struct CompressOutcome {
    pub artifact: Artifact,
    /// Size of the composed document before recompression
    pub original_size: u64,
    /// Preset chosen for the request. `None` when a size search found the
    /// document already within budget.
    pub preset: Option<CompressionPreset>,
    /// True when the returned bytes are the unrecompressed document
    pub kept_original: bool,
    /// Always true for quality compression
    pub budget_met: bool,
    pub report: Option<RecompressReport>,
    /// Presets tried by a size search, in order
    pub attempts: Vec<Attempt>,
    pub skipped_sources: Vec<SkippedSource>,
}

impl CompressOutcome {
    pub fn size(&self) -> u64 {
        self.artifact.bytes.len() as u64
    }
}

/// `None` means "every page of every file", anything else must parse to a non-empty list
fn selection_from(instructions_json: Option<&str>) -> Result<Selection, ValidationError> {
    match instructions_json {
        None => Ok(Selection::AllPages),
        Some(json) => {
            let instructions = parse_instructions(json)?;
            if instructions.is_empty() {
                return Err(ValidationError::MalformedInstructions(
                    "instruction list is empty".into(),
                ));
            }
            Ok(Selection::Pages(instructions))
        }
    }
}

fn compose(sources: &SourceSet, selection: &Selection) -> Result<Document, PdfError> {
    let compiler = PageInstructionCompiler::new(sources);
    let instructions = compiler.resolve(selection)?;
    compiler.compile(&instructions)
}

/// Download name for a compressed result: `<base>_compressed.pdf` for one source
fn compressed_name(sources: &SourceSet) -> String {
    match (sources.len(), sources.ids().next()) {
        (1, Some(id)) => archive::compressed_entry_name(&archive::base_name(id)),
        _ => "compressed.pdf".to_string(),
    }
}

/// Merge pages from several files into one PDF.
///
/// Without instructions every page of every file is appended in upload order.
pub fn merge<I, N, B>(
    files: I,
    instructions_json: Option<&str>,
    config: &EngineConfig,
) -> Result<Artifact, PdfError>
where
    I: IntoIterator<Item = (N, B)>,
    N: Into<String>,
    B: AsRef<[u8]>,
{
    let selection = selection_from(instructions_json)?;
    let sources = SourceSet::open(files, config.source_policy)?;

    let mut doc = compose(&sources, &selection)?;
    let page_count = doc.get_pages().len();
    let bytes = DocumentWriter::new(config.write).write(&mut doc)?;

    info!(
        "Merged {} pages from {} files into {} bytes",
        page_count,
        sources.len(),
        bytes.len()
    );
    Ok(Artifact::pdf(bytes, "merged.pdf"))
}

/// Split one file. A selection gives one PDF; an explosion or range split
/// gives a ZIP of `<base>_page_<n>.pdf`.
pub fn split(
    file_name: &str,
    bytes: &[u8],
    request: SplitRequest,
    config: &EngineConfig,
) -> Result<Artifact, PdfError> {
    let sources = SourceSet::open([(file_name, bytes)], CorruptSourcePolicy::Abort)?;
    let writer = DocumentWriter::new(config.write);
    let base = archive::base_name(file_name);

    match split::split(&sources, file_name, &request)? {
        split::SplitOutput::Single(mut doc) => {
            let bytes = writer.write(&mut doc)?;
            info!("Extracted {} pages from '{}'", doc.get_pages().len(), file_name);
            Ok(Artifact::pdf(bytes, format!("{}_extracted.pdf", base)))
        }
        split::SplitOutput::Parts(parts) => {
            let mut entries = Vec::with_capacity(parts.len());
            for mut part in parts {
                let bytes = writer.write(&mut part.document)?;
                entries.push((archive::page_entry_name(&base, part.page_number), bytes));
            }
            info!("Split '{}' into {} files", file_name, entries.len());
            Ok(Artifact::zip(archive::bundle(entries)?, format!("{}_pages.zip", base)))
        }
    }
}

/// Compose, then recompress every image at the preset the quality dial selects.
///
/// Images with transparency are flattened onto white. The result is never
/// larger than the composed input: if recompression grows the document, the
/// composed input is returned instead.
pub fn compress_by_quality<I, N, B>(
    files: I,
    instructions_json: Option<&str>,
    quality: Quality,
    config: &EngineConfig,
) -> Result<CompressOutcome, PdfError>
where
    I: IntoIterator<Item = (N, B)>,
    N: Into<String>,
    B: AsRef<[u8]>,
{
    let selection = selection_from(instructions_json)?;
    let sources = SourceSet::open(files, config.source_policy)?;
    let writer = DocumentWriter::new(config.write);

    let mut doc = compose(&sources, &selection)?;
    let baseline = writer.write(&mut doc.clone())?;
    let original_size = baseline.len() as u64;

    let tier = config.quality_table.tier_for(quality);
    let preset = tier.preset;
    info!(
        "Quality {} selects {:?}: {} DPI, JPEG quality {}",
        quality.percent(),
        tier.label,
        preset.target_dpi,
        preset.jpeg_quality
    );

    let report = ImageRecompressor::new(preset)
        .with_min_dpi(config.min_dpi)
        .recompress(&mut doc);
    let compressed = writer.write(&mut doc)?;

    let kept_original = compressed.len() > baseline.len();
    let bytes = if kept_original {
        warn!(
            "Recompression grew the document ({} > {} bytes); returning it unrecompressed",
            compressed.len(),
            baseline.len()
        );
        baseline
    } else {
        compressed
    };
    info!("Compressed {} -> {} bytes", original_size, bytes.len());

    Ok(CompressOutcome {
        artifact: Artifact::pdf(bytes, compressed_name(&sources)),
        original_size,
        preset: Some(preset),
        kept_original,
        budget_met: true,
        report: Some(report),
        attempts: Vec::new(),
        skipped_sources: sources.skipped().to_vec(),
    })
}

/// Compose, then search the quality table's presets for the weakest one
/// whose output fits `target`.
///
/// An unreachable target is not an error: the strongest result comes back
/// with `budget_met == false`. A single uploaded file that already fits is
/// returned byte for byte.
pub fn compress_to_size<I, N, B>(
    files: I,
    instructions_json: Option<&str>,
    target: TargetSize,
    config: &EngineConfig,
) -> Result<CompressOutcome, PdfError>
where
    I: IntoIterator<Item = (N, B)>,
    N: Into<String>,
    B: AsRef<[u8]>,
{
    let selection = selection_from(instructions_json)?;
    let budget = target.to_budget(config.size_range_floor)?;
    let files: Vec<(String, B)> = files.into_iter().map(|(n, b)| (n.into(), b)).collect();

    let sources = SourceSet::open(
        files.iter().map(|(name, bytes)| (name.clone(), bytes.as_ref())),
        config.source_policy,
    )?;

    if let ([(name, raw)], Selection::AllPages) = (files.as_slice(), &selection) {
        let raw = raw.as_ref();
        if budget.is_met(raw.len() as u64) {
            info!(
                "'{}' already fits {} bytes ({} bytes), returning it unchanged",
                name,
                budget.max_bytes,
                raw.len()
            );
            return Ok(CompressOutcome {
                artifact: Artifact::pdf(raw.to_vec(), compressed_name(&sources)),
                original_size: raw.len() as u64,
                preset: None,
                kept_original: true,
                budget_met: true,
                report: None,
                attempts: Vec::new(),
                skipped_sources: Vec::new(),
            });
        }
    }

    let doc = compose(&sources, &selection)?;
    let search = SizeTargetSearch::new(config.quality_table.ladder(), DocumentWriter::new(config.write))
        .with_min_dpi(config.min_dpi);
    let outcome = search.run(&doc, &budget)?;

    if outcome.budget_met {
        info!(
            "Compressed {} -> {} bytes (target {} bytes)",
            outcome.original_size,
            outcome.size(),
            budget.max_bytes
        );
    } else {
        warn!(
            "Could not reach {} bytes; best effort is {} bytes",
            budget.max_bytes,
            outcome.size()
        );
    }

    Ok(CompressOutcome {
        artifact: Artifact::pdf(outcome.bytes, compressed_name(&sources)),
        original_size: outcome.original_size,
        preset: outcome.preset,
        kept_original: outcome.preset.is_none(),
        budget_met: outcome.budget_met,
        report: outcome.report,
        attempts: outcome.attempts,
        skipped_sources: sources.skipped().to_vec(),
    })
}

/// Compress each file on its own and bundle the results as
/// `<base>_compressed.pdf` entries of one ZIP.
///
/// Under [`CorruptSourcePolicy::Skip`] unreadable files are left out of the
/// archive; otherwise the first one fails the batch.
pub fn compress_batch<I, N, B>(
    files: I,
    quality: Quality,
    config: &EngineConfig,
) -> Result<Artifact, PdfError>
where
    I: IntoIterator<Item = (N, B)>,
    N: Into<String>,
    B: AsRef<[u8]>,
{
    let mut entries = Vec::new();
    let mut used_names = HashSet::new();
    let mut first_error = None;

    for (name, bytes) in files {
        let name: String = name.into();
        let outcome = match compress_by_quality([(name.as_str(), bytes.as_ref())], None, quality, config) {
            Ok(outcome) => outcome,
            Err(e @ PdfError::CorruptSource { .. })
                if config.source_policy == CorruptSourcePolicy::Skip =>
            {
                warn!("Leaving '{}' out of the batch: {}", name, e);
                first_error.get_or_insert(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let base = archive::base_name(&name);
        let mut entry_name = archive::compressed_entry_name(&base);
        let mut suffix = 2;
        while !used_names.insert(entry_name.clone()) {
            entry_name = archive::compressed_entry_name(&format!("{}_{}", base, suffix));
            suffix += 1;
        }
        entries.push((entry_name, outcome.artifact.bytes));
    }

    if entries.is_empty() {
        return Err(first_error.unwrap_or_else(|| ValidationError::EmptySourceSet.into()));
    }

    info!("Compressed {} files into one archive", entries.len());
    Ok(Artifact::zip(archive::bundle(entries)?, "compressed.zip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_image_pdf, create_test_pdf, page_content, page_rotation};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_types() {
        assert_eq!(ContentType::Pdf.mime(), "application/pdf");
        assert_eq!(ContentType::Zip.mime(), "application/zip");
    }

    #[test]
    fn test_merge_scenario() {
        let files = vec![("A", create_test_pdf(5, "A")), ("B", create_test_pdf(3, "B"))];
        let instructions = r#"[
            {"sourceFile": "A", "pageIndex": 2, "rotation": 0},
            {"sourceFile": "B", "pageIndex": 0, "rotation": 90},
            {"sourceFile": "A", "pageIndex": 0}
        ]"#;

        let artifact = merge(files, Some(instructions), &EngineConfig::default()).unwrap();
        assert_eq!(artifact.content_type, ContentType::Pdf);

        let doc = Document::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert_eq!(page_content(&doc, 0), b"BT /F1 12 Tf 50 700 Td (A-Page-3) Tj ET".to_vec());
        assert_eq!(page_content(&doc, 1), b"BT /F1 12 Tf 50 700 Td (B-Page-1) Tj ET".to_vec());
        assert_eq!(page_content(&doc, 2), b"BT /F1 12 Tf 50 700 Td (A-Page-1) Tj ET".to_vec());
        assert_eq!(page_rotation(&doc, 0), 0);
        assert_eq!(page_rotation(&doc, 1), 90);
    }

    #[test]
    fn test_merge_without_instructions_appends_everything() {
        let files = vec![("x.pdf", create_test_pdf(2, "X")), ("y.pdf", create_test_pdf(1, "Y"))];
        let artifact = merge(files, None, &EngineConfig::default()).unwrap();

        let doc = Document::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert_eq!(page_content(&doc, 2), b"BT /F1 12 Tf 50 700 Td (Y-Page-1) Tj ET".to_vec());
    }

    #[test]
    fn test_merge_rejects_explicit_empty_list() {
        let files = vec![("x.pdf", create_test_pdf(2, "X"))];
        let err = merge(files, Some("[]"), &EngineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PdfError::Validation(ValidationError::MalformedInstructions(_))
        ));
    }

    #[test]
    fn test_merge_rejects_bad_json_before_opening_files() {
        let files = vec![("x.pdf", b"not a pdf".to_vec())];
        let err = merge(files, Some("{"), &EngineConfig::default()).unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(
            err,
            PdfError::Validation(ValidationError::MalformedInstructions(_))
        ));
    }

    #[test]
    fn test_corrupt_source_policy() {
        let files = || vec![("good.pdf", create_test_pdf(1, "G")), ("bad.pdf", b"garbage".to_vec())];

        let err = merge(files(), None, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, PdfError::CorruptSource { ref source_id, .. } if source_id == "bad.pdf"));

        let config = EngineConfig {
            source_policy: CorruptSourcePolicy::Skip,
            ..EngineConfig::default()
        };
        let artifact = merge(files(), None, &config).unwrap();
        let doc = Document::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_compress_by_quality_names_single_source() {
        let files = vec![("scan.pdf", create_image_pdf(&[(400, 400)], 144.0))];
        let outcome =
            compress_by_quality(files, None, Quality::from_percent(50).unwrap(), &EngineConfig::default())
                .unwrap();

        assert_eq!(outcome.artifact.file_name, "scan_compressed.pdf");
        assert_eq!(outcome.preset, Some(CompressionPreset::new(150, 75)));
        assert!(outcome.size() <= outcome.original_size);
    }

    #[test]
    fn test_compress_to_size_rejects_zero_target() {
        let files = vec![("scan.pdf", create_test_pdf(1, "Z"))];
        let err = compress_to_size(
            files,
            None,
            TargetSize::new(0, SizeUnit::Kilobytes),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PdfError::Validation(ValidationError::InvalidTargetSize(_))
        ));
    }
}
