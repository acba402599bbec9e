#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported result shape: {0}")]
    UnsupportedShape(String),
    #[error("query failed: {0}")]
    Execution(String),
    #[error("image unavailable: {0}")]
    Image(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid note title: {0}")]
    InvalidTitle(String),
    #[error("note already exists: {0}")]
    NoteExists(std::path::PathBuf),
    #[error("note folder must stay inside the vault: {0}")]
    InvalidFolder(String),
}

impl RenderError {
    /// Short label for the kind of failure, shown on error cards.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Json(_) => "internal",
            Self::UnsupportedShape(_) => "shape",
            Self::Execution(_) => "execution",
            Self::Image(_) => "image",
            Self::MissingField(_) | Self::InvalidTitle(_) | Self::NoteExists(_) | Self::InvalidFolder(_) => {
                "note"
            }
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
