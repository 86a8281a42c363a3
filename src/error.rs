use std::path::PathBuf;

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown language '{0}' (run with --list-languages to see supported names)")]
    UnknownLanguage(String),

    #[error("failed to open pdf {}: {source}", path.display())]
    DocumentOpen {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("failed to decode image {image} on page {page}: {message}")]
    ImageDecode {
        page: usize,
        image: usize,
        message: String,
    },

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("Gemini API key is empty")]
    MissingCredential,

    #[error("AI service error: {0}")]
    AiService(String),

    #[error("unparseable AI response: {0}")]
    ResponseParse(#[from] ResponseParseError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("no ```json block found in response")]
    NoJsonBlock,

    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("unexpected JSON shape: {0}")]
    WrongShape(#[source] serde_json::Error),
}
