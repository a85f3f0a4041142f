//! Path-based helpers for the command line

use crate::error::PdfError;
use crate::Artifact;
use std::fs;
use std::path::{Path, PathBuf};

/// Read one input, keyed by its file name (the name page instructions refer to)
pub fn read_input(path: &Path) -> Result<(String, Vec<u8>), PdfError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path).map_err(|e| {
        PdfError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    Ok((name, bytes))
}

pub fn read_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<(String, Vec<u8>)>, PdfError> {
    paths.iter().map(|p| read_input(p.as_ref())).collect()
}

/// Write an artifact. A directory target receives the artifact's own file name.
pub fn write_artifact(artifact: &Artifact, output: &Path) -> Result<PathBuf, PdfError> {
    let path = if output.is_dir() {
        output.join(&artifact.file_name)
    } else {
        output.to_path_buf()
    };
    fs::write(&path, &artifact.bytes)?;
    log::info!("Wrote {} bytes to {}", artifact.bytes.len(), path.display());
    Ok(path)
}
