//! Unified error types for webpaper.
//!
//! Every variant renders as `CODE: detail` so log lines and CLI output share
//! one format.

/// Coarse classification of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller handed us something unusable.
    Input,
    /// Network, timeout, status or browser-session failure.
    Fetch,
    /// No article could be located.
    Extraction,
    /// Layout, asset or output failure while producing the document.
    Render,
}

/// Unified error type for the conversion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL could not be parsed or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Network failure while talking to the server.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Server answered with a non-success status.
    #[error("HTTP_STATUS: {0}")]
    HttpStatus(u16),

    /// Request exceeded the configured timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Response body exceeded the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Scripted browser session failed to start or crashed.
    #[error("BROWSER_FAILED: {0}")]
    BrowserFailed(String),

    /// Scripted browser is turned off in configuration.
    #[error("BROWSER_DISABLED")]
    BrowserDisabled,

    /// No extraction strategy produced an article.
    #[error("EXTRACT_FAILED: {0}")]
    ExtractFailed(String),

    /// Document rendering failed.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// Filesystem failure while writing output.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error into one of the pipeline error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl(_) => ErrorKind::Input,
            Error::HttpError(_)
            | Error::HttpStatus(_)
            | Error::FetchTimeout(_)
            | Error::FetchTooLarge(_)
            | Error::BrowserFailed(_)
            | Error::BrowserDisabled => ErrorKind::Fetch,
            Error::ExtractFailed(_) => ErrorKind::Extraction,
            Error::RenderFailed(_) | Error::Io(_) => ErrorKind::Render,
        }
    }

    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::HttpError(_) | Error::FetchTimeout(_) => true,
            Error::HttpStatus(status) => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
