use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid flag word: {value}. Must be a decimal or 0x-prefixed hexadecimal u32")]
    InvalidFlagWord { value: String },

    #[error("Nothing to do: {hint}")]
    NothingToDo { hint: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Retrieval(#[from] aquaret::Error),
}
