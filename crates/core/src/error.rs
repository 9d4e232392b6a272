use pagemark_engine::PdfEngineError;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("no document is open")]
    NoDocument,
    #[error("no annotation is selected")]
    NothingSelected,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("text is empty")]
    EmptyText,
    #[error("no image is pending for placement")]
    NoPendingImage,
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("edit script error: {0}")]
    Script(#[from] serde_json::Error),
    #[error("invalid rotation {0} (expected a multiple of 90)")]
    InvalidRotation(i64),
}

pub type EditorResult<T> = Result<T, EditorError>;
