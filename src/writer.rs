use crate::error::PdfError;
use lopdf::{Document, Object, ObjectId, SaveOptions};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Deflate level for packed object streams
const OBJECT_STREAM_COMPRESSION: u32 = 6;

/// Container-level serialization options. None of these touch image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteOptions {
    /// Pack indirect objects into object streams, with an xref stream
    pub object_streams: bool,
    /// Deflate content streams that carry no filter yet
    pub compress_streams: bool,
    /// Reorder for progressive rendering
    pub linearize: bool,
    /// Drop objects nothing references before writing
    pub prune_unused: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            object_streams: true,
            compress_streams: true,
            linearize: false,
            prune_unused: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentWriter {
    options: WriteOptions,
}

impl DocumentWriter {
    pub fn new(options: WriteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Serialize `doc`. Pruning and stream compression happen in place.
    pub fn write(&self, doc: &mut Document) -> Result<Vec<u8>, PdfError> {
        check_page_tree(doc)?;

        if self.options.prune_unused {
            let pruned = doc.prune_objects();
            if !pruned.is_empty() {
                debug!("Pruned {} unreferenced objects", pruned.len());
            }
        }
        if self.options.compress_streams {
            doc.compress();
        }

        let mut buffer = Vec::new();
        if self.options.object_streams || self.options.linearize {
            let save_options = SaveOptions::builder()
                .use_object_streams(self.options.object_streams)
                .use_xref_streams(self.options.object_streams)
                .linearize(self.options.linearize)
                .compression_level(OBJECT_STREAM_COMPRESSION)
                .build();
            doc.save_with_options(&mut buffer, save_options)
                .map_err(|e| PdfError::Serialization(e.to_string()))?;
        } else {
            doc.save_to(&mut buffer)
                .map_err(|e| PdfError::Serialization(e.to_string()))?;
        }

        debug!("Serialized {} objects into {} bytes", doc.objects.len(), buffer.len());
        Ok(buffer)
    }
}

/// Every `Kids` entry reachable from the catalog must resolve
fn check_page_tree(doc: &Document) -> Result<(), PdfError> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfError::Serialization("document has no /Root".into()))?;
    let pages_id = doc
        .get_dictionary(root_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|_| PdfError::Serialization("catalog has no /Pages".into()))?;

    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut pending = vec![pages_id];
    while let Some(node_id) = pending.pop() {
        if !visited.insert(node_id) {
            continue;
        }
        let node = doc
            .get_dictionary(node_id)
            .map_err(|_| PdfError::Serialization(format!("dangling page tree reference {:?}", node_id)))?;
        if let Ok(Object::Array(kids)) = node.get(b"Kids") {
            for kid in kids {
                match kid {
                    Object::Reference(id) => pending.push(*id),
                    other => {
                        return Err(PdfError::Serialization(format!(
                            "page tree entry is not a reference: {:?}",
                            other
                        )))
                    }
                }
            }
        }
    }
    Ok(())
}
