//! Raster decode and JPEG encode for PDF image streams

use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Unsupported color space: {0}")]
    UnsupportedColorSpace(String),

    #[error("Unsupported bits per component: {0}")]
    UnsupportedBitDepth(u32),

    #[error("Pixel data size mismatch: got {got} bytes, expected {expected}")]
    DataSize { got: usize, expected: usize },

    #[error("Failed to decode: {0}")]
    Decode(String),

    #[error("Failed to encode JPEG: {0}")]
    Encode(String),
}

/// First filter name of a stream, if any
pub fn first_filter(stream: &Stream) -> Option<String> {
    match stream.dict.get(b"Filter").ok()? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        Object::Array(arr) => arr.first().and_then(|f| match f {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        }),
        _ => None,
    }
}

fn filter_count(stream: &Stream) -> usize {
    match stream.dict.get(b"Filter") {
        Ok(Object::Array(arr)) => arr.len(),
        Ok(Object::Name(_)) => 1,
        _ => 0,
    }
}

/// Family name of an image's color space (`DeviceRGB`, `ICCBased`, `Indexed`...)
pub fn color_space_name(obj: &Object, doc: &Document) -> String {
    match obj {
        Object::Name(name) => String::from_utf8_lossy(name).to_string(),
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
            _ => "Unknown".to_string(),
        },
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(resolved) => color_space_name(resolved, doc),
            Err(_) => "Unknown".to_string(),
        },
        _ => "Unknown".to_string(),
    }
}

/// Component count of an ICCBased color space from its `/N` entry
fn icc_components(obj: &Object, doc: &Document) -> Option<i64> {
    let arr = match obj {
        Object::Array(arr) => arr,
        Object::Reference(id) => return icc_components(doc.get_object(*id).ok()?, doc),
        _ => return None,
    };
    let profile = match arr.get(1)? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match profile {
        Object::Stream(stream) => stream.dict.get(b"N").and_then(Object::as_i64).ok(),
        _ => None,
    }
}

fn inflate(content: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(content);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(decoded)
}

/// Raw samples of an image stream that is unfiltered or FlateDecode only
fn raw_samples(stream: &Stream) -> Result<Vec<u8>, CodecError> {
    if filter_count(stream) > 1 {
        return Err(CodecError::UnsupportedFilter("filter chain".into()));
    }
    match first_filter(stream).as_deref() {
        None => Ok(stream.content.clone()),
        Some("FlateDecode") => {
            if stream.dict.has(b"DecodeParms") {
                return Err(CodecError::UnsupportedFilter("FlateDecode with predictor".into()));
            }
            inflate(&stream.content)
        }
        Some(other) => Err(CodecError::UnsupportedFilter(other.to_string())),
    }
}

fn exact<'a>(data: &'a [u8], expected: usize) -> Result<&'a [u8], CodecError> {
    if data.len() < expected {
        return Err(CodecError::DataSize {
            got: data.len(),
            expected,
        });
    }
    Ok(&data[..expected])
}

/// Decode a PDF image XObject into pixels
pub fn decode_image(stream: &Stream, doc: &Document) -> Result<DynamicImage, CodecError> {
    let width = crate::scanner::dimension(&stream.dict, b"Width");
    let height = crate::scanner::dimension(&stream.dict, b"Height");
    if width == 0 || height == 0 {
        return Err(CodecError::Decode("invalid dimensions".into()));
    }

    if filter_count(stream) == 1 && first_filter(stream).as_deref() == Some("DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
            .map_err(|e| CodecError::Decode(e.to_string()));
    }

    let bits = match stream.dict.get(b"BitsPerComponent") {
        Ok(Object::Integer(n)) => *n as u32,
        _ => 8,
    };
    if bits != 8 {
        return Err(CodecError::UnsupportedBitDepth(bits));
    }
    if stream.dict.has(b"Decode") {
        return Err(CodecError::Decode("custom /Decode arrays are not supported".into()));
    }

    let color_space_obj = stream
        .dict
        .get(b"ColorSpace")
        .cloned()
        .unwrap_or(Object::Name(b"DeviceRGB".to_vec()));
    let color_space = color_space_name(&color_space_obj, doc);

    let components = match color_space.as_str() {
        "DeviceRGB" | "CalRGB" => 3,
        "DeviceGray" | "CalGray" => 1,
        "DeviceCMYK" => 4,
        "ICCBased" => match icc_components(&color_space_obj, doc) {
            Some(n @ (1 | 3 | 4)) => n as usize,
            _ => return Err(CodecError::UnsupportedColorSpace("ICCBased without /N".into())),
        },
        other => return Err(CodecError::UnsupportedColorSpace(other.to_string())),
    };

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| CodecError::Decode(format!("{}x{} image is too large", width, height)))?;
    let expected = pixels
        .checked_mul(components)
        .ok_or_else(|| CodecError::Decode(format!("{}x{} image is too large", width, height)))?;

    let samples = raw_samples(stream)?;
    let data = exact(&samples, expected)?;

    match components {
        1 => GrayImage::from_raw(width, height, data.to_vec())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| CodecError::Decode("grayscale buffer".into())),
        3 => RgbImage::from_raw(width, height, data.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| CodecError::Decode("RGB buffer".into())),
        _ => {
            let mut rgb = Vec::with_capacity(pixels * 3);
            for chunk in data.chunks_exact(4) {
                let k = 1.0 - chunk[3] as f32 / 255.0;
                for &ink in &chunk[..3] {
                    rgb.push(((1.0 - ink as f32 / 255.0) * k * 255.0) as u8);
                }
            }
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| CodecError::Decode("CMYK buffer".into()))
        }
    }
}

/// Decode a soft mask into one alpha byte per pixel of `width` x `height`.
///
/// Masks stored at another size are resized to match the image.
pub fn decode_soft_mask(
    stream: &Stream,
    doc: &Document,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    let mask = decode_image(stream, doc)?.to_luma8();
    let mask = if mask.dimensions() != (width, height) {
        image::imageops::resize(&mask, width, height, image::imageops::FilterType::Triangle)
    } else {
        mask
    };
    Ok(mask.into_raw())
}

/// Composite `img` with `alpha` over white. The result has no alpha channel.
pub fn flatten_onto_white(img: &DynamicImage, alpha: Option<&[u8]>) -> DynamicImage {
    let rgba: RgbaImage = match alpha {
        Some(alpha) => {
            let mut rgba = img.to_rgba8();
            for (pixel, &a) in rgba.pixels_mut().zip(alpha) {
                pixel.0[3] = a;
            }
            rgba
        }
        None if img.color().has_alpha() => img.to_rgba8(),
        None => return img.clone(),
    };

    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);
    for (out, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let a = src.0[3] as u32;
        for c in 0..3 {
            out.0[c] = ((src.0[c] as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Resample an image to target dimensions
pub fn resample(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_exact(width, height, image::imageops::FilterType::Lanczos3)
}

/// Encode as baseline JPEG and wrap it in a DCTDecode image XObject.
///
/// Grayscale input stays grayscale; everything else becomes DeviceRGB.
pub fn encode_jpeg_stream(img: &DynamicImage, quality: u8) -> Result<Stream, CodecError> {
    let (width, height) = (img.width(), img.height());
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(CodecError::Encode(format!("{}x{} exceeds JPEG limits", width, height)));
    }

    let grayscale = matches!(img, DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_));
    let (pixels, color_type, color_space) = if grayscale {
        (img.to_luma8().into_raw(), jpeg_encoder::ColorType::Luma, "DeviceGray")
    } else {
        (img.to_rgb8().into_raw(), jpeg_encoder::ColorType::Rgb, "DeviceRGB")
    };

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality.clamp(1, 100));
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder
        .encode(&pixels, width as u16, height as u16, color_type)
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"DCTDecode".to_vec())),
        ("Length", Object::Integer(jpeg_bytes.len() as i64)),
    ]);

    Ok(Stream::new(dict, jpeg_bytes).with_compression(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_rgb_image, noise_rgb};
    use image::Rgba;

    fn doc_with_image(width: u32, height: u32) -> (Document, Stream) {
        let mut doc = Document::with_version("1.5");
        let id = add_rgb_image(&mut doc, width, height, 3);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap().clone();
        (doc, stream)
    }

    #[test]
    fn test_decode_flate_rgb() {
        let (doc, stream) = doc_with_image(16, 8);
        let img = decode_image(&stream, &doc).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
        assert_eq!(img.to_rgb8().into_raw(), noise_rgb(16, 8, 3));
    }

    #[test]
    fn test_decode_rejects_unsupported_filter() {
        let (doc, mut stream) = doc_with_image(4, 4);
        stream.dict.set("Filter", Object::Name(b"CCITTFaxDecode".to_vec()));
        assert_eq!(
            decode_image(&stream, &doc).unwrap_err(),
            CodecError::UnsupportedFilter("CCITTFaxDecode".into())
        );
    }

    #[test]
    fn test_decode_rejects_indexed_color() {
        let (doc, mut stream) = doc_with_image(4, 4);
        stream.dict.set(
            "ColorSpace",
            Object::Array(vec![Object::Name(b"Indexed".to_vec())]),
        );
        assert!(matches!(
            decode_image(&stream, &doc),
            Err(CodecError::UnsupportedColorSpace(_))
        ));
    }

    #[test]
    fn test_decode_detects_truncated_samples() {
        let (doc, mut stream) = doc_with_image(4, 4);
        stream.dict.remove(b"Filter");
        stream.set_content(vec![0u8; 10]);
        assert!(matches!(
            decode_image(&stream, &doc),
            Err(CodecError::DataSize { got: 10, expected: 48 })
        ));
    }

    #[test]
    fn test_flatten_composites_over_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba), None);
        assert!(!flat.color().has_alpha());
        let rgb = flat.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_flatten_with_separate_mask() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, image::Rgb([0, 0, 0])));
        let flat = flatten_onto_white(&img, Some(&[0, 255]));
        let rgb = flat.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_encode_jpeg_stream_round_trips() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_raw(32, 16, noise_rgb(32, 16, 1)).unwrap());
        let stream = encode_jpeg_stream(&img, 70).unwrap();
        assert_eq!(first_filter(&stream).as_deref(), Some("DCTDecode"));
        assert!(stream.content.starts_with(&[0xFF, 0xD8]));

        let doc = Document::with_version("1.5");
        let decoded = decode_image(&stream, &doc).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_encode_keeps_grayscale() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, image::Luma([128])));
        let stream = encode_jpeg_stream(&img, 80).unwrap();
        assert_eq!(
            stream.dict.get(b"ColorSpace").unwrap(),
            &Object::Name(b"DeviceGray".to_vec())
        );
    }
}
