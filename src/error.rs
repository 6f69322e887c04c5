use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported pair {base}/{quote}")]
    UnsupportedPair { base: String, quote: String },

    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl NotifierError {
    pub fn unsupported(base: &str, quote: &str) -> Self {
        NotifierError::UnsupportedPair {
            base: base.to_string(),
            quote: quote.to_string(),
        }
    }
}
