//! Splitting one source into pieces
//!
//! Splitting is composition against a single source. Only the fan-out
//! differs: a selective split composes one document, an explosion composes
//! one single-page document per source page.

use crate::compose::PageInstructionCompiler;
use crate::error::{PdfError, ValidationError};
use crate::instruction::{parse_ranges, PageInstruction};
use crate::source::SourceSet;
use lopdf::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitRequest {
    /// Compose exactly these pages into one document
    Select(Vec<PageInstruction>),
    /// One document per page of the source
    Explode,
    /// One document per page named by a range string such as `"1-3, 7"`
    Ranges(String),
}

impl SplitRequest {
    /// An empty instruction list means "no selection": explode every page
    pub fn from_instructions(instructions: Vec<PageInstruction>) -> Self {
        if instructions.is_empty() {
            SplitRequest::Explode
        } else {
            SplitRequest::Select(instructions)
        }
    }
}

/// One single-page piece of a split
#[derive(Debug, Clone)]
pub struct SplitPart {
    /// 1-based page number in the source
    pub page_number: u32,
    pub document: Document,
}

#[derive(Debug, Clone)]
pub enum SplitOutput {
    Single(Document),
    Parts(Vec<SplitPart>),
}

pub fn split(
    sources: &SourceSet,
    source_id: &str,
    request: &SplitRequest,
) -> Result<SplitOutput, PdfError> {
    let compiler = PageInstructionCompiler::new(sources);

    match request {
        SplitRequest::Select(instructions) => {
            Ok(SplitOutput::Single(compiler.compile(instructions)?))
        }
        SplitRequest::Explode => {
            let page_count = sources.page_count(source_id)? as u32;
            let pages: Vec<u32> = (1..=page_count).collect();
            Ok(SplitOutput::Parts(single_pages(&compiler, source_id, &pages)?))
        }
        SplitRequest::Ranges(ranges) => {
            let page_count = sources.page_count(source_id)? as u32;
            let pages = parse_ranges(ranges, page_count)?;
            if pages.is_empty() {
                return Err(ValidationError::InvalidRange("No pages specified".into()).into());
            }
            Ok(SplitOutput::Parts(single_pages(&compiler, source_id, &pages)?))
        }
    }
}

/// Compose one independent document per 1-based page number, in the given order
fn single_pages(
    compiler: &PageInstructionCompiler,
    source_id: &str,
    pages: &[u32],
) -> Result<Vec<SplitPart>, PdfError> {
    // Validate every page before composing any of them
    let instructions: Vec<PageInstruction> = pages
        .iter()
        .map(|&page| PageInstruction::new(source_id, page as usize - 1, 0))
        .collect();
    compiler.validate(&instructions)?;

    let mut parts = Vec::with_capacity(pages.len());
    for (&page_number, instruction) in pages.iter().zip(instructions) {
        let document = compiler.compile(std::slice::from_ref(&instruction))?;
        parts.push(SplitPart {
            page_number,
            document,
        });
    }
    log::debug!("Split '{}' into {} single-page documents", source_id, parts.len());
    Ok(parts)
}
