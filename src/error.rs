use thiserror::Error;

/// Problems with what the caller asked for. Reported before any heavy work runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown source file: {0}")]
    UnknownSource(String),

    #[error("Page index {page_index} out of range for '{source_id}' (document has {page_count} pages)")]
    PageIndexOutOfRange {
        source_id: String,
        page_index: usize,
        page_count: usize,
    },

    #[error("Rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i64),

    #[error("Malformed page instructions: {0}")]
    MalformedInstructions(String),

    #[error("Quality must be within 0-100 (or 0.0-1.0), got {0}")]
    InvalidQuality(String),

    #[error("Invalid target size: {0}")]
    InvalidTargetSize(String),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("Invalid compression preset ladder: {0}")]
    InvalidPresetLadder(String),

    #[error("No source documents supplied")]
    EmptySourceSet,

    #[error("Source file supplied twice: {0}")]
    DuplicateSource(String),
}

#[derive(Error, Debug)]
pub enum PdfError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to open source '{source_id}': {message}")]
    CorruptSource { source_id: String, message: String },

    #[error("Failed to serialize PDF: {0}")]
    Serialization(String),

    #[error("Failed to build archive: {0}")]
    Archive(String),

    /// Engine configuration that does not parse or validate. Set by whoever
    /// deploys the engine, so never blamed on a request.
    #[error("Invalid engine config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    /// True when the failure was caused by the request rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PdfError::Validation(_) | PdfError::CorruptSource { .. }
        )
    }
}

pub type Result<T, E = PdfError> = std::result::Result<T, E>;
