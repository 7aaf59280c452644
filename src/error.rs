use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("transport error {0}")]
    Transport(String),
    #[error("invalid uri {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
    #[error("serde_json error {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "curl")]
    #[error("curl error {0}")]
    Curl(#[from] curl::Error),
    #[cfg(feature = "curl")]
    #[error("curl multi error {0}")]
    CurlMulti(#[from] curl::MultiError),
    #[error("http client shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-transfer failure reported by a transport alongside a completion.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{description} (code {code})")]
pub struct TransferFailure {
    /// Transport specific result code.
    pub code: u32,
    pub description: String,
}

impl TransferFailure {
    pub fn new(code: u32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// A failure raised by the engine itself rather than the transport.
    /// These carry code 0.
    pub fn engine(description: impl Into<String>) -> Self {
        Self::new(0, description)
    }
}

/// The message a [`ResponseHandler`](crate::ResponseHandler) failure carries,
/// as seen by async callers of [`fetch`](crate::HttpClientEngine::fetch).
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ResponseError(pub String);
