//! ZIP packaging for multi-document results

use crate::error::PdfError;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File stem of an uploaded name: `"report.final.pdf"` -> `"report.final"`
pub fn base_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

/// `<base>_page_<n>.pdf`, `page_number` is 1-based
pub fn page_entry_name(base: &str, page_number: u32) -> String {
    format!("{}_page_{}.pdf", base, page_number)
}

/// `<base>_compressed.pdf`
pub fn compressed_entry_name(base: &str) -> String {
    format!("{}_compressed.pdf", base)
}

/// Bundle named PDFs into one deflated ZIP, in the given order
pub fn bundle<N, B>(entries: impl IntoIterator<Item = (N, B)>) -> Result<Vec<u8>, PdfError>
where
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, bytes) in entries {
            zip.start_file(name.as_ref(), options)
                .map_err(|e| PdfError::Archive(format!("Failed to create entry {}: {}", name.as_ref(), e)))?;
            zip.write_all(bytes.as_ref())
                .map_err(|e| PdfError::Archive(format!("Failed to write entry {}: {}", name.as_ref(), e)))?;
        }
        zip.finish()
            .map_err(|e| PdfError::Archive(format!("Failed to finish archive: {}", e)))?;
    }
    Ok(buffer)
}
