//! Synthetic PDFs for unit tests

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

/// Build a document with N pages whose content streams name the page
pub fn create_test_document(num_pages: u32, content_prefix: &str) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for page_num in 0..num_pages {
        let content = format!(
            "BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET",
            content_prefix,
            page_num + 1
        );
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    finish_page_tree(&mut doc, pages_id, &page_ids);
    doc
}

/// Same as [`create_test_document`], serialized
pub fn create_test_pdf(num_pages: u32, content_prefix: &str) -> Vec<u8> {
    let mut doc = create_test_document(num_pages, content_prefix);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Deterministic noise so image streams do not deflate away
pub fn noise_rgb(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..width * height * 3)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Add a FlateDecode DeviceRGB image XObject
pub fn add_rgb_image(doc: &mut Document, width: u32, height: u32, seed: u32) -> ObjectId {
    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"FlateDecode".to_vec())),
    ]);
    doc.add_object(Stream::new(dict, deflate(&noise_rgb(width, height, seed))))
}

/// Build a document with one page per entry, each page drawing one noise
/// image `(pixel_width, pixel_height)` scaled to `display_points` square.
pub fn create_image_document(images: &[(u32, u32)], display_points: f32) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for (i, &(width, height)) in images.iter().enumerate() {
        let image_id = add_rgb_image(&mut doc, width, height, i as u32 + 1);
        page_ids.push(add_image_page(&mut doc, pages_id, image_id, display_points));
    }

    finish_page_tree(&mut doc, pages_id, &page_ids);
    doc
}

pub fn create_image_pdf(images: &[(u32, u32)], display_points: f32) -> Vec<u8> {
    let mut doc = create_image_document(images, display_points);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Add a page that paints `image_id` as `/Im1` at `display_points` square
pub fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image_id: ObjectId,
    display_points: f32,
) -> ObjectId {
    let content = format!("q {0} 0 0 {0} 36 36 cm /Im1 Do Q", display_points);
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let xobjects = Dictionary::from_iter(vec![("Im1", Object::Reference(image_id))]);
    let resources = Dictionary::from_iter(vec![("XObject", Object::Dictionary(xobjects))]);
    let page = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Resources", Object::Dictionary(resources)),
        ("Contents", Object::Reference(content_id)),
    ]);
    doc.add_object(page)
}

/// One page whose only image is painted by a tiling pattern fill, 100 pt per tile
pub fn create_pattern_image_document(size: u32) -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = add_rgb_image(&mut doc, size, size, 3);

    let pattern_res = Dictionary::from_iter(vec![(
        "XObject",
        Object::Dictionary(Dictionary::from_iter(vec![("Tile", Object::Reference(image_id))])),
    )]);
    let pattern = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pattern".to_vec())),
        ("PatternType", Object::Integer(1)),
        ("PaintType", Object::Integer(1)),
        ("TilingType", Object::Integer(1)),
        (
            "BBox",
            Object::Array([0, 0, 100, 100].into_iter().map(Object::Integer).collect()),
        ),
        ("XStep", Object::Integer(100)),
        ("YStep", Object::Integer(100)),
        ("Resources", Object::Dictionary(pattern_res)),
    ]);
    let pattern_id = doc.add_object(Stream::new(pattern, b"q 100 0 0 100 0 0 cm /Tile Do Q".to_vec()));

    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        b"/Pattern cs /P0 scn 0 0 612 792 re f".to_vec(),
    ));
    let resources = Dictionary::from_iter(vec![(
        "Pattern",
        Object::Dictionary(Dictionary::from_iter(vec![("P0", Object::Reference(pattern_id))])),
    )]);
    let page_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Resources", Object::Dictionary(resources)),
        ("Contents", Object::Reference(content_id)),
    ]));
    finish_page_tree(&mut doc, pages_id, &[page_id]);
    (doc, image_id)
}

/// Write the Pages node, catalog and trailer for `page_ids`
pub fn finish_page_tree(doc: &mut Document, pages_id: ObjectId, page_ids: &[ObjectId]) {
    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));
}

/// Decoded content stream of the zero-based page
pub fn page_content(doc: &Document, page_index: usize) -> Vec<u8> {
    let page_id = *doc.get_pages().values().nth(page_index).unwrap();
    doc.get_page_content(page_id).unwrap()
}

/// `/Rotate` of the zero-based page, 0 when absent
pub fn page_rotation(doc: &Document, page_index: usize) -> i64 {
    let page_id = *doc.get_pages().values().nth(page_index).unwrap();
    doc.get_dictionary(page_id)
        .unwrap()
        .get(b"Rotate")
        .and_then(|r| r.as_i64())
        .unwrap_or(0)
}
