//! Image recompression
//!
//! Every image XObject reachable from the page tree is decoded, downsampled
//! when its effective resolution is above the preset's target DPI, and
//! re-encoded as JPEG at the preset quality. Images are replaced in place,
//! under the same object id, so nothing that references them changes.
//!
//! Images with a soft mask are flattened onto white before encoding and lose
//! their `/SMask`: JPEG has no alpha channel. This cannot be undone.
//!
//! A single image that cannot be decoded or encoded never fails the
//! document. The failure is recorded in the [`RecompressReport`] and the
//! image stays as it was.

use crate::codec::{self, CodecError};
use crate::preset::CompressionPreset;
use crate::scanner::{self, ImageDisplayInfo, PlacementScanner};
use lopdf::{Document, Object, ObjectId, Stream};
use log::{debug, warn};
use std::collections::HashMap;
use thiserror::Error;

/// Entries of the original image dictionary carried over to the re-encoded one
const PRESERVED_KEYS: &[&[u8]] = &[b"Intent", b"Interpolate", b"Metadata", b"Name", b"OC", b"StructParent"];

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Image {object_id:?} left unmodified: {reason}")]
pub struct ImageRecompressError {
    pub object_id: ObjectId,
    pub reason: CodecError,
}

/// Why an image was deliberately left as it was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// `/ImageMask true`: a 1-bit stencil, not a picture
    StencilMask,
    /// The re-encoded stream was not smaller than the original
    NotSmaller,
    /// `/Mask` is a colour-key range, which lossy samples would no longer match
    ColorKeyMask,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageChange {
    Recompressed {
        original_bytes: usize,
        new_bytes: usize,
        /// New pixel size when the image was downsampled
        resized: Option<(u32, u32)>,
        flattened_alpha: bool,
    },
    Unmodified(KeepReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub object_id: ObjectId,
    pub result: Result<ImageChange, ImageRecompressError>,
}

/// What happened to every image of one recompression pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecompressReport {
    pub images: Vec<ImageOutcome>,
}

impl RecompressReport {
    pub fn total(&self) -> usize {
        self.images.len()
    }

    pub fn recompressed(&self) -> usize {
        self.images
            .iter()
            .filter(|o| matches!(o.result, Ok(ImageChange::Recompressed { .. })))
            .count()
    }

    pub fn unmodified(&self) -> usize {
        self.images
            .iter()
            .filter(|o| matches!(o.result, Ok(ImageChange::Unmodified(_))))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.images.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImageRecompressError> {
        self.images.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Image stream bytes saved by the pass
    pub fn bytes_saved(&self) -> usize {
        self.images
            .iter()
            .map(|o| match o.result {
                Ok(ImageChange::Recompressed {
                    original_bytes,
                    new_bytes,
                    ..
                }) => original_bytes.saturating_sub(new_bytes),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRecompressor {
    preset: CompressionPreset,
    min_dpi: f32,
}

impl ImageRecompressor {
    pub fn new(preset: CompressionPreset) -> Self {
        Self {
            preset,
            min_dpi: 0.0,
        }
    }

    /// Never downsample images at or below `min_dpi`
    pub fn with_min_dpi(mut self, min_dpi: f32) -> Self {
        self.min_dpi = min_dpi.max(0.0);
        self
    }

    pub fn preset(&self) -> CompressionPreset {
        self.preset
    }

    /// Recompress every reachable image of `doc` in place
    pub fn recompress(&self, doc: &mut Document) -> RecompressReport {
        let display_info = PlacementScanner::new(doc).scan();
        let image_ids = scanner::reachable_images(doc);
        debug!(
            "Recompressing {} images at {} DPI, quality {}",
            image_ids.len(),
            self.preset.target_dpi,
            self.preset.jpeg_quality
        );

        let mut report = RecompressReport::default();
        for object_id in image_ids {
            let result = match self.recompress_image(doc, object_id, &display_info) {
                Ok((change, replacement)) => {
                    if let Some(stream) = replacement {
                        doc.objects.insert(object_id, Object::Stream(stream));
                    }
                    Ok(change)
                }
                Err(reason) => {
                    let err = ImageRecompressError { object_id, reason };
                    warn!("{}", err);
                    Err(err)
                }
            };
            report.images.push(ImageOutcome { object_id, result });
        }

        debug!(
            "Recompressed {}/{} images ({} unmodified, {} failed), saved {} bytes",
            report.recompressed(),
            report.total(),
            report.unmodified(),
            report.failed(),
            report.bytes_saved()
        );
        report
    }

    fn recompress_image(
        &self,
        doc: &Document,
        object_id: ObjectId,
        display_info: &HashMap<ObjectId, ImageDisplayInfo>,
    ) -> Result<(ImageChange, Option<Stream>), CodecError> {
        let stream = match doc.get_object(object_id) {
            Ok(Object::Stream(stream)) => stream,
            _ => return Err(CodecError::Decode("not an image stream".into())),
        };

        if matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
            debug!("Image {:?}: stencil mask, keeping", object_id);
            return Ok((ImageChange::Unmodified(KeepReason::StencilMask), None));
        }

        let mask = match stream.dict.get(b"Mask") {
            Ok(Object::Reference(id)) => doc.get_object(*id).ok().map(|target| (Some(*id), target)),
            Ok(direct) => Some((None, direct)),
            Err(_) => None,
        };
        // A stencil /Mask is independent of the image samples and carries over
        let stencil_mask = match mask {
            Some((_, Object::Array(_))) => {
                debug!("Image {:?}: colour-key mask, keeping", object_id);
                return Ok((ImageChange::Unmodified(KeepReason::ColorKeyMask), None));
            }
            Some((Some(id), Object::Stream(_))) => Some(id),
            _ => None,
        };

        let width = scanner::dimension(&stream.dict, b"Width");
        let height = scanner::dimension(&stream.dict, b"Height");
        let display = display_info
            .get(&object_id)
            .copied()
            .unwrap_or_else(|| ImageDisplayInfo::unplaced(width, height));
        let current_dpi = display.max_effective_dpi();

        debug!(
            "Image {:?}: {}x{} px, {:.1}x{:.1} pt, {:.1} DPI ({})",
            object_id,
            width,
            height,
            display.display_width_points,
            display.display_height_points,
            current_dpi,
            codec::first_filter(stream).as_deref().unwrap_or("raw")
        );

        let img = codec::decode_image(stream, doc)?;

        let smask = match stream.dict.get(b"SMask") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Stream(mask)) => Some(mask),
                _ => None,
            },
            _ => None,
        };
        let (img, flattened_alpha) = match smask {
            Some(mask) => {
                let alpha = codec::decode_soft_mask(mask, doc, img.width(), img.height())?;
                (codec::flatten_onto_white(&img, Some(&alpha)), true)
            }
            None => {
                let had_alpha = img.color().has_alpha();
                (codec::flatten_onto_white(&img, None), had_alpha)
            }
        };

        let target_dpi = self.preset.target_dpi as f32;
        let needs_resampling = current_dpi > target_dpi + 1.0 && current_dpi > self.min_dpi;
        let resized = if needs_resampling {
            let (target_width, target_height) = display.target_pixels_for_dpi(target_dpi);
            (target_width < img.width() || target_height < img.height())
                .then_some((target_width, target_height))
        } else {
            None
        };

        let img = match resized {
            Some((w, h)) => {
                debug!("  Resampling from {}x{} to {}x{}", img.width(), img.height(), w, h);
                codec::resample(&img, w, h)
            }
            None => img,
        };

        let mut new_stream = codec::encode_jpeg_stream(&img, self.preset.jpeg_quality)?;
        for key in PRESERVED_KEYS {
            if let Ok(value) = stream.dict.get(key) {
                new_stream.dict.set(key.to_vec(), value.clone());
            }
        }
        if let Some(mask_id) = stencil_mask {
            new_stream.dict.set("Mask", Object::Reference(mask_id));
        }

        let original_bytes = stream.content.len() + smask.map_or(0, |m| m.content.len());
        let new_bytes = new_stream.content.len();
        if new_bytes >= original_bytes {
            debug!(
                "  Keeping original: re-encode is {} bytes, original {}",
                new_bytes, original_bytes
            );
            return Ok((ImageChange::Unmodified(KeepReason::NotSmaller), None));
        }

        Ok((
            ImageChange::Recompressed {
                original_bytes,
                new_bytes,
                resized,
                flattened_alpha,
            },
            Some(new_stream),
        ))
    }
}
