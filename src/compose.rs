//! Page composition
//!
//! Builds a new document from an ordered list of page instructions.
//!
//! Pages are imported by copying the page dictionary and everything it
//! references (resources, content streams, annotations) into the output
//! document under fresh object ids. Objects shared by several pages of the
//! same source are copied once and shared again in the output. References
//! that lead back into the source page tree (`/Parent`, `/P`, link
//! destinations) are cut, so importing one page never drags in the rest of
//! its source.

use crate::error::{PdfError, ValidationError};
use crate::instruction::{PageInstruction, Selection};
use crate::source::SourceSet;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Version written into composed documents; object streams need 1.5+
const OUTPUT_VERSION: &str = "1.7";

/// Turns page instructions into a new document drawn from a [`SourceSet`]
pub struct PageInstructionCompiler<'s> {
    sources: &'s SourceSet,
}

impl<'s> PageInstructionCompiler<'s> {
    pub fn new(sources: &'s SourceSet) -> Self {
        Self { sources }
    }

    /// Expand a selection into concrete instructions.
    ///
    /// `AllPages` walks every source in upload order. An explicit empty list
    /// is rejected: there is nothing sensible to compose from it.
    pub fn resolve(&self, selection: &Selection) -> Result<Vec<PageInstruction>, ValidationError> {
        match selection {
            Selection::AllPages => {
                let mut instructions = Vec::new();
                for (source_id, doc) in self.sources.iter() {
                    for page_index in 0..doc.get_pages().len() {
                        instructions.push(PageInstruction::new(source_id, page_index, 0));
                    }
                }
                Ok(instructions)
            }
            Selection::Pages(pages) if pages.is_empty() => Err(
                ValidationError::MalformedInstructions("no pages selected".into()),
            ),
            Selection::Pages(pages) => Ok(pages.clone()),
        }
    }

    /// Check every instruction against the sources, returning the source page ids
    pub fn validate(&self, instructions: &[PageInstruction]) -> Result<Vec<ObjectId>, ValidationError> {
        instructions
            .iter()
            .map(|instruction| {
                instruction.validate_rotation()?;
                self.sources
                    .page_id(&instruction.source_id, instruction.page_index)
            })
            .collect()
    }

    /// Compose one document whose page `i` is the page named by `instructions[i]`.
    ///
    /// Every instruction is validated before any page is copied.
    pub fn compile(&self, instructions: &[PageInstruction]) -> Result<Document, PdfError> {
        if instructions.is_empty() {
            return Err(ValidationError::MalformedInstructions("no pages selected".into()).into());
        }

        let page_ids = self.validate(instructions)?;
        let resolved = instructions.iter().zip(page_ids);

        let mut dest = Document::with_version(OUTPUT_VERSION);
        let pages_id = dest.new_object_id();

        let mut importers: HashMap<&str, PageImporter> = HashMap::new();
        let mut kids = Vec::with_capacity(instructions.len());

        for (instruction, page_id) in resolved {
            let source_id = instruction.source_id.as_str();
            let source = self.sources.get(source_id)?;
            let importer = importers
                .entry(source_id)
                .or_insert_with(|| PageImporter::new(source_id, source));

            let new_page_id =
                importer.import_page(&mut dest, page_id, pages_id, instruction.rotation)?;

            log::debug!(
                "Composed page {} from '{}' page {} (rotation {:+})",
                kids.len() + 1,
                source_id,
                instruction.page_index,
                instruction.rotation
            );
            kids.push(Object::Reference(new_page_id));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        dest.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = dest.add_object(catalog);
        dest.trailer.set("Root", Object::Reference(catalog_id));

        Ok(dest)
    }
}

/// Copies pages out of one source, remembering what it already copied
struct PageImporter<'a> {
    source_id: &'a str,
    source: &'a Document,
    /// source object id -> output object id
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageImporter<'a> {
    fn new(source_id: &'a str, source: &'a Document) -> Self {
        Self {
            source_id,
            source,
            id_map: HashMap::new(),
        }
    }

    /// Copy one page into `dest` under `parent_id`, turning it by `rotation` degrees.
    ///
    /// The page dictionary itself is always copied fresh, so the same source
    /// page can appear several times with different rotations.
    fn import_page(
        &mut self,
        dest: &mut Document,
        page_id: ObjectId,
        parent_id: ObjectId,
        rotation: i64,
    ) -> Result<ObjectId, PdfError> {
        let mut page = self
            .source
            .get_dictionary(page_id)
            .map_err(|e| PdfError::CorruptSource {
                source_id: self.source_id.to_string(),
                message: format!("page object {:?}: {}", page_id, e),
            })?
            .clone();

        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(self.source, &page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }

        let current = page_rotation(self.source, &page);
        let new_rotation = (current.rem_euclid(360) + rotation.rem_euclid(360)) % 360;

        page.remove(b"Parent");
        self.rewrite_dict(dest, &mut page);

        if new_rotation != 0 || page.has(b"Rotate") {
            page.set("Rotate", Object::Integer(new_rotation));
        }
        page.set("Parent", Object::Reference(parent_id));

        Ok(dest.add_object(Object::Dictionary(page)))
    }

    /// Replace every reference in `object` with its copy in `dest`
    fn rewrite(&mut self, dest: &mut Document, object: Object) -> Object {
        match object {
            Object::Reference(id) => match self.import_object(dest, id) {
                Some(new_id) => Object::Reference(new_id),
                None => Object::Null,
            },
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.rewrite(dest, item))
                    .collect(),
            ),
            Object::Dictionary(mut dict) => {
                self.rewrite_dict(dest, &mut dict);
                Object::Dictionary(dict)
            }
            Object::Stream(mut stream) => {
                self.rewrite_dict(dest, &mut stream.dict);
                Object::Stream(stream)
            }
            other => other,
        }
    }

    fn rewrite_dict(&mut self, dest: &mut Document, dict: &mut Dictionary) {
        for (_, value) in dict.iter_mut() {
            let original = std::mem::replace(value, Object::Null);
            *value = self.rewrite(dest, original);
        }
    }

    /// Copy a source object once; `None` for dangling refs and page-tree nodes.
    fn import_object(&mut self, dest: &mut Document, id: ObjectId) -> Option<ObjectId> {
        if let Some(&new_id) = self.id_map.get(&id) {
            return Some(new_id);
        }
        if is_page_tree_node(self.source, id) {
            return None;
        }

        let object = self.source.get_object(id).ok()?.clone();
        let new_id = dest.new_object_id();
        // Registered before recursing so cycles terminate
        self.id_map.insert(id, new_id);

        let rewritten = self.rewrite(dest, object);
        dest.objects.insert(new_id, rewritten);
        Some(new_id)
    }
}

fn is_page_tree_node(doc: &Document, id: ObjectId) -> bool {
    match doc.get_dictionary(id).and_then(|d| d.get(b"Type")) {
        Ok(Object::Name(name)) => name == b"Page" || name == b"Pages",
        _ => false,
    }
}

/// Walk the `/Parent` chain looking for `key`
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut seen = HashSet::new();
    let mut current = page.get(b"Parent").and_then(Object::as_reference).ok();

    while let Some(node_id) = current {
        if !seen.insert(node_id) {
            break;
        }
        let node = doc.get_dictionary(node_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

/// Current `/Rotate` of a page dictionary in degrees
fn page_rotation(doc: &Document, page: &Dictionary) -> i64 {
    let value = match page.get(b"Rotate") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(value) => Some(value),
        Err(_) => None,
    };

    match value {
        Some(Object::Integer(n)) => *n,
        Some(Object::Real(n)) => n.round() as i64,
        _ => 0,
    }
}
