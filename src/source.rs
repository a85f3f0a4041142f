//! Request-scoped source documents
//!
//! Every uploaded file is opened once into a `SourceSet`. The set owns the
//! documents for the whole request; composition only borrows from it, so no
//! source can be released while a document built from it is still being
//! written.

use crate::error::{PdfError, ValidationError};
use indexmap::IndexMap;
use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};

/// What to do when one of several uploads fails to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptSourcePolicy {
    /// Fail the whole request
    #[default]
    Abort,
    /// Leave the file out and carry on; instructions naming it then fail as unknown sources
    Skip,
}

/// A source that was left out under [`CorruptSourcePolicy::Skip`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub source_id: String,
    pub message: String,
}

/// Opened source documents keyed by upload name, in upload order
#[derive(Debug, Default)]
pub struct SourceSet {
    documents: IndexMap<String, Document>,
    skipped: Vec<SkippedSource>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every `(name, bytes)` pair.
    pub fn open<I, N, B>(files: I, policy: CorruptSourcePolicy) -> Result<Self, PdfError>
    where
        I: IntoIterator<Item = (N, B)>,
        N: Into<String>,
        B: AsRef<[u8]>,
    {
        let mut set = SourceSet::new();

        for (name, bytes) in files {
            let name = name.into();
            if set.documents.contains_key(&name) {
                return Err(ValidationError::DuplicateSource(name).into());
            }

            match Document::load_mem(bytes.as_ref()) {
                Ok(doc) => {
                    log::debug!(
                        "Opened source '{}' ({} pages)",
                        name,
                        doc.get_pages().len()
                    );
                    set.documents.insert(name, doc);
                }
                Err(e) => match policy {
                    CorruptSourcePolicy::Abort => {
                        return Err(PdfError::CorruptSource {
                            source_id: name,
                            message: e.to_string(),
                        });
                    }
                    CorruptSourcePolicy::Skip => {
                        log::warn!("Skipping unreadable source '{}': {}", name, e);
                        set.skipped.push(SkippedSource {
                            source_id: name,
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        if set.documents.is_empty() {
            if let Some(first) = set.skipped.first() {
                return Err(PdfError::CorruptSource {
                    source_id: first.source_id.clone(),
                    message: first.message.clone(),
                });
            }
            return Err(ValidationError::EmptySourceSet.into());
        }

        Ok(set)
    }

    /// Add an already-opened document
    pub fn insert(
        &mut self,
        source_id: impl Into<String>,
        doc: Document,
    ) -> Result<(), ValidationError> {
        let source_id = source_id.into();
        if self.documents.contains_key(&source_id) {
            return Err(ValidationError::DuplicateSource(source_id));
        }
        self.documents.insert(source_id, doc);
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Result<&Document, ValidationError> {
        self.documents
            .get(source_id)
            .ok_or_else(|| ValidationError::UnknownSource(source_id.to_string()))
    }

    /// Object id of the zero-based `page_index` in `source_id`
    pub fn page_id(&self, source_id: &str, page_index: usize) -> Result<ObjectId, ValidationError> {
        let doc = self.get(source_id)?;
        let pages = doc.get_pages();
        pages
            .values()
            .nth(page_index)
            .copied()
            .ok_or_else(|| ValidationError::PageIndexOutOfRange {
                source_id: source_id.to_string(),
                page_index,
                page_count: pages.len(),
            })
    }

    pub fn page_count(&self, source_id: &str) -> Result<usize, ValidationError> {
        Ok(self.get(source_id)?.get_pages().len())
    }

    /// Source names in upload order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.documents.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn skipped(&self) -> &[SkippedSource] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
