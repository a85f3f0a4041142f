//! Image placement scanner
//!
//! Walks every content stream reachable from the pages (page contents, Form
//! XObjects, tiling patterns, soft-mask groups and annotation appearances)
//! while tracking the current transformation matrix, and records how large
//! each image XObject is drawn. Pixel size divided by drawn size gives the
//! image's effective resolution on the page.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{HashMap, HashSet};

/// Pixel size of an image and the largest size it is drawn at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageDisplayInfo {
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Display width in points (72 points = 1 inch)
    pub display_width_points: f32,
    pub display_height_points: f32,
}

impl ImageDisplayInfo {
    /// Display info for an image that is never drawn: one pixel per point (72 DPI)
    pub fn unplaced(pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            pixel_width,
            pixel_height,
            display_width_points: pixel_width as f32,
            display_height_points: pixel_height as f32,
        }
    }

    pub fn effective_dpi_x(&self) -> f32 {
        let display_inches = self.display_width_points / 72.0;
        if display_inches > 0.0 {
            self.pixel_width as f32 / display_inches
        } else {
            0.0
        }
    }

    pub fn effective_dpi_y(&self) -> f32 {
        let display_inches = self.display_height_points / 72.0;
        if display_inches > 0.0 {
            self.pixel_height as f32 / display_inches
        } else {
            0.0
        }
    }

    pub fn max_effective_dpi(&self) -> f32 {
        self.effective_dpi_x().max(self.effective_dpi_y())
    }

    /// Pixel size that shows the image at `target_dpi` at its display size.
    ///
    /// Never larger than the current pixel size.
    pub fn target_pixels_for_dpi(&self, target_dpi: f32) -> (u32, u32) {
        let width = (self.display_width_points / 72.0 * target_dpi).round() as u32;
        let height = (self.display_height_points / 72.0 * target_dpi).round() as u32;

        (
            width.clamp(1, self.pixel_width.max(1)),
            height.clamp(1, self.pixel_height.max(1)),
        )
    }
}

/// 2D transformation matrix [a b c d e f]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let n = |i: usize| operands[i].as_float().ok();
        Some(Matrix {
            a: n(0)?,
            b: n(1)?,
            c: n(2)?,
            d: n(3)?,
            e: n(4)?,
            f: n(5)?,
        })
    }

    /// `/Matrix` entry of a form or pattern, identity when absent
    fn from_dict(dict: &Dictionary) -> Matrix {
        match dict.get(b"Matrix") {
            Ok(Object::Array(values)) => Matrix::from_operands(values).unwrap_or(Matrix::IDENTITY),
            _ => Matrix::IDENTITY,
        }
    }

    /// self * other
    fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn scale_x(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn scale_y(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<Vec<u8>> {
    match dict.get(key) {
        Ok(Object::Name(name)) => Some(name.clone()),
        _ => None,
    }
}

pub(crate) fn is_image(stream: &Stream) -> bool {
    name_of(&stream.dict, b"Subtype").as_deref() == Some(b"Image".as_slice())
}

fn is_form(stream: &Stream) -> bool {
    name_of(&stream.dict, b"Subtype").as_deref() == Some(b"Form".as_slice())
}

pub(crate) fn dimension(dict: &Dictionary, key: &[u8]) -> u32 {
    match dict.get(key) {
        Ok(Object::Integer(n)) if *n > 0 => u32::try_from(*n).unwrap_or(0),
        _ => 0,
    }
}

/// Resources of a page, following `/Parent` for inherited ones
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut seen = HashSet::new();
    let mut current = Some(page_id);

    while let Some(node_id) = current {
        if !seen.insert(node_id) {
            break;
        }
        let node = doc.get_dictionary(node_id).ok()?;
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

/// `name -> object id` entries of one resource category (`XObject`, `ExtGState`, ...)
fn named_resources(doc: &Document, resources: Option<&Dictionary>, category: &[u8]) -> HashMap<Vec<u8>, ObjectId> {
    let mut result = HashMap::new();

    let entries = resources
        .and_then(|res| res.get(category).ok())
        .and_then(|entries| resolve_dict(doc, entries));

    if let Some(entries) = entries {
        for (name, value) in entries.iter() {
            if let Object::Reference(id) = value {
                result.insert(name.clone(), *id);
            }
        }
    }

    result
}

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Concatenated, decoded `/Contents` of a page
fn contents_bytes(doc: &Document, contents: &Object) -> Vec<u8> {
    match resolve(doc, contents) {
        Some(Object::Stream(stream)) => stream_bytes(stream),
        Some(Object::Array(parts)) => {
            let mut combined = Vec::new();
            for part in parts {
                combined.extend(contents_bytes(doc, part));
                combined.push(b'\n');
            }
            combined
        }
        _ => Vec::new(),
    }
}

/// Collects the drawn size of every image placement in a document
pub struct PlacementScanner<'a> {
    doc: &'a Document,
    /// image id -> every (width, height) in points it is drawn at
    placements: HashMap<ObjectId, Vec<(f32, f32)>>,
    /// forms and patterns already scanned
    visited: HashSet<ObjectId>,
}

impl<'a> PlacementScanner<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            placements: HashMap::new(),
            visited: HashSet::new(),
        }
    }

    /// Scan every page and return display info for every placed image
    pub fn scan(mut self) -> HashMap<ObjectId, ImageDisplayInfo> {
        for (page_number, page_id) in self.doc.get_pages() {
            log::trace!("Scanning page {} for image placements", page_number);
            let Ok(page) = self.doc.get_dictionary(page_id) else {
                continue;
            };

            let resources = page_resources(self.doc, page_id);
            if let Ok(contents) = page.get(b"Contents") {
                let content = contents_bytes(self.doc, contents);
                self.scan_content(&content, resources, Matrix::IDENTITY);
            }

            self.scan_annotations(page);
        }

        self.into_display_info()
    }

    fn scan_content(&mut self, data: &[u8], resources: Option<&'a Dictionary>, initial: Matrix) {
        let xobjects = named_resources(self.doc, resources, b"XObject");
        let extgstates = named_resources(self.doc, resources, b"ExtGState");

        for pattern_id in named_resources(self.doc, resources, b"Pattern").into_values() {
            self.scan_pattern(pattern_id, initial);
        }

        let content = match Content::decode(data) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("Unparseable content stream: {}", e);
                return;
            }
        };

        let mut stack = vec![initial];
        for operation in &content.operations {
            let current = stack.last().copied().unwrap_or(Matrix::IDENTITY);

            match operation.operator.as_str() {
                "q" => stack.push(current),
                "Q" => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                "cm" => {
                    if let (Some(m), Some(top)) =
                        (Matrix::from_operands(&operation.operands), stack.last_mut())
                    {
                        *top = m.concat(&current);
                    }
                }
                "gs" => {
                    let form = operand_name(&operation.operands)
                        .and_then(|name| extgstates.get(name))
                        .and_then(|&gs_id| soft_mask_group(self.doc, gs_id));
                    if let Some(form_id) = form {
                        self.scan_form(form_id, current);
                    }
                }
                "Do" => {
                    let target = operand_name(&operation.operands).and_then(|name| xobjects.get(name));
                    if let Some(&id) = target {
                        self.paint_xobject(id, current);
                    }
                }
                _ => {}
            }
        }
    }

    fn paint_xobject(&mut self, id: ObjectId, ctm: Matrix) {
        let Ok(Object::Stream(stream)) = self.doc.get_object(id) else {
            return;
        };

        if is_image(stream) {
            let (width, height) = (ctm.scale_x(), ctm.scale_y());
            if width > 0.0 && height > 0.0 {
                self.placements.entry(id).or_default().push((width, height));
            }
        } else if is_form(stream) {
            self.scan_form(id, ctm);
        }
    }

    fn scan_form(&mut self, form_id: ObjectId, parent: Matrix) {
        self.scan_nested_stream(form_id, parent);
    }

    fn scan_pattern(&mut self, pattern_id: ObjectId, parent: Matrix) {
        // Only tiling patterns (PatternType 1) carry a content stream
        if let Ok(Object::Stream(stream)) = self.doc.get_object(pattern_id) {
            if matches!(stream.dict.get(b"PatternType"), Ok(Object::Integer(1))) {
                self.scan_nested_stream(pattern_id, parent);
            }
        }
    }

    fn scan_nested_stream(&mut self, id: ObjectId, parent: Matrix) {
        if !self.visited.insert(id) {
            return;
        }
        let Ok(Object::Stream(stream)) = self.doc.get_object(id) else {
            return;
        };

        let matrix = Matrix::from_dict(&stream.dict).concat(&parent);
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|res| resolve_dict(self.doc, res));
        let content = stream_bytes(stream);
        self.scan_content(&content, resources, matrix);
    }

    fn scan_annotations(&mut self, page: &Dictionary) {
        for id in annotation_appearances(self.doc, page) {
            self.scan_form(id, Matrix::IDENTITY);
        }
    }

    fn into_display_info(self) -> HashMap<ObjectId, ImageDisplayInfo> {
        let mut result = HashMap::new();

        for (id, sizes) in self.placements {
            let Ok(Object::Stream(stream)) = self.doc.get_object(id) else {
                continue;
            };
            let (pixel_width, pixel_height) = (
                dimension(&stream.dict, b"Width"),
                dimension(&stream.dict, b"Height"),
            );
            if pixel_width == 0 || pixel_height == 0 {
                continue;
            }

            // Largest placement keeps the most detail
            let (width, height) = sizes
                .into_iter()
                .fold((0.0f32, 0.0f32), |best, size| {
                    if size.0 * size.1 > best.0 * best.1 {
                        size
                    } else {
                        best
                    }
                });

            result.insert(
                id,
                ImageDisplayInfo {
                    pixel_width,
                    pixel_height,
                    display_width_points: width,
                    display_height_points: height,
                },
            );
        }

        result
    }
}

fn operand_name(operands: &[Object]) -> Option<&[u8]> {
    match operands.last() {
        Some(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

/// `/G` form of an ExtGState's soft mask
fn soft_mask_group(doc: &Document, gs_id: ObjectId) -> Option<ObjectId> {
    let gs = doc.get_dictionary(gs_id).ok()?;
    let smask = resolve_dict(doc, gs.get(b"SMask").ok()?)?;
    smask.get(b"G").and_then(Object::as_reference).ok()
}

/// Normal, rollover and down appearance streams of every annotation on a page
fn annotation_appearances(doc: &Document, page: &Dictionary) -> Vec<ObjectId> {
    let annots = match page.get(b"Annots").ok().and_then(|a| resolve(doc, a)) {
        Some(Object::Array(annots)) => annots,
        _ => return Vec::new(),
    };

    let mut streams = Vec::new();
    for annot in annots {
        let Some(appearances) = resolve_dict(doc, annot)
            .and_then(|a| a.get(b"AP").ok())
            .and_then(|ap| resolve_dict(doc, ap))
        else {
            continue;
        };

        for key in [b"N".as_slice(), b"R".as_slice(), b"D".as_slice()] {
            if let Ok(entry) = appearances.get(key) {
                streams.extend(appearance_streams(doc, entry));
            }
        }
    }
    streams
}

/// An appearance entry is either a stream or a dictionary of state streams
fn appearance_streams(doc: &Document, entry: &Object) -> Vec<ObjectId> {
    match entry {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Stream(_)) => vec![*id],
            Ok(Object::Dictionary(states)) => state_refs(states),
            _ => Vec::new(),
        },
        Object::Dictionary(states) => state_refs(states),
        _ => Vec::new(),
    }
}

fn state_refs(states: &Dictionary) -> Vec<ObjectId> {
    states
        .iter()
        .filter_map(|(_, value)| value.as_reference().ok())
        .collect()
}

/// Every image XObject reachable from the pages, in page order.
///
/// Follows the same edges as [`PlacementScanner`]: XObjects, tiling patterns,
/// soft-mask groups of graphics states and annotation appearances, recursing
/// into the resources of each. Soft masks and `/Mask` streams hang off image
/// dictionaries and are not included.
pub fn reachable_images(doc: &Document) -> Vec<ObjectId> {
    let mut collector = ImageCollector {
        doc,
        images: Vec::new(),
        seen: HashSet::new(),
    };

    for (_, page_id) in doc.get_pages() {
        collector.visit_resources(page_resources(doc, page_id));
        if let Ok(page) = doc.get_dictionary(page_id) {
            for id in annotation_appearances(doc, page) {
                collector.visit(id);
            }
        }
    }

    collector.images
}

struct ImageCollector<'a> {
    doc: &'a Document,
    images: Vec<ObjectId>,
    seen: HashSet<ObjectId>,
}

impl<'a> ImageCollector<'a> {
    fn visit_resources(&mut self, resources: Option<&'a Dictionary>) {
        let sorted = |category: &[u8]| {
            let mut ids: Vec<ObjectId> = named_resources(self.doc, resources, category)
                .into_values()
                .collect();
            ids.sort();
            ids
        };

        let xobjects = sorted(b"XObject");
        let patterns = sorted(b"Pattern");
        let groups: Vec<ObjectId> = sorted(b"ExtGState")
            .into_iter()
            .filter_map(|gs_id| soft_mask_group(self.doc, gs_id))
            .collect();

        for id in xobjects.into_iter().chain(patterns).chain(groups) {
            self.visit(id);
        }
    }

    /// An image, or a content stream (form, tiling pattern, appearance) to descend into
    fn visit(&mut self, id: ObjectId) {
        if !self.seen.insert(id) {
            return;
        }
        let Ok(Object::Stream(stream)) = self.doc.get_object(id) else {
            return;
        };

        if is_image(stream) {
            self.images.push(id);
            return;
        }
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|res| resolve_dict(self.doc, res));
        self.visit_resources(resources);
    }
}
