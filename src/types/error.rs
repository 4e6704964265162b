/// Error when decoding a request frame.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The frame is not JSON, or is missing `method` or `url`.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The method is an empty string.
    #[error("Request method is empty")]
    EmptyMethod,
}
