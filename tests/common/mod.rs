#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

fn save(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn media_box() -> Object {
    Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Integer(792),
    ])
}

fn finish(doc: &mut Document, pages_id: ObjectId, page_ids: Vec<ObjectId>) {
    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.into_iter().map(Object::Reference).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
}

pub fn label(prefix: &str, page_number: u32) -> Vec<u8> {
    format!("BT /F1 12 Tf 72 720 Td ({} page {}) Tj ET", prefix, page_number).into_bytes()
}

/// N text pages whose content streams read "<prefix> page <n>"
pub fn text_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let page_ids = (1..=num_pages)
        .map(|n| {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), label(prefix, n)));
            doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("MediaBox", media_box()),
                ("Contents", Object::Reference(content_id)),
            ]))
        })
        .collect();

    finish(&mut doc, pages_id, page_ids);
    save(doc)
}

fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

/// One page per entry, each drawing a `size` x `size` RGB noise image over 144 pt
pub fn photo_pdf(sizes: &[u32]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for (i, &size) in sizes.iter().enumerate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&noise((size * size * 3) as usize, i as u32 + 7))
            .unwrap();
        let image = Stream::new(
            Dictionary::from_iter(vec![
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Image".to_vec())),
                ("Width", Object::Integer(size as i64)),
                ("Height", Object::Integer(size as i64)),
                ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
                ("BitsPerComponent", Object::Integer(8)),
                ("Filter", Object::Name(b"FlateDecode".to_vec())),
            ]),
            encoder.finish().unwrap(),
        );
        let image_id = doc.add_object(image);

        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            b"q 144 0 0 144 72 72 cm /Photo Do Q".to_vec(),
        ));
        let resources = Dictionary::from_iter(vec![(
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Photo",
                Object::Reference(image_id),
            )])),
        )]);
        page_ids.push(doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("MediaBox", media_box()),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ])));
    }

    finish(&mut doc, pages_id, page_ids);
    save(doc)
}

/// Content of the zero-based page
pub fn content_of(doc: &Document, page_index: usize) -> Vec<u8> {
    let page_id = *doc.get_pages().values().nth(page_index).unwrap();
    doc.get_page_content(page_id).unwrap()
}

pub fn rotation_of(doc: &Document, page_index: usize) -> i64 {
    let page_id = *doc.get_pages().values().nth(page_index).unwrap();
    doc.get_dictionary(page_id)
        .unwrap()
        .get(b"Rotate")
        .and_then(|r| r.as_i64())
        .unwrap_or(0)
}
