use thiserror::Error;

/// The one error type every adapter and the router return.
///
/// Transport and decode failures are folded into these four kinds so callers
/// never match on vendor-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// The composed request URL did not parse (malformed base URL)
    #[error("invalid URL, check the provider base URL in settings")]
    InvalidUrl,

    /// The server answered with a status outside `[200, 299)`
    #[error("HTTP {0}{hint}", hint = status_hint(.0))]
    BadResponse(u16),

    /// The body could not be decoded, or the expected text was missing
    #[error("response format abnormal")]
    InvalidResponse,

    /// No usable credential was configured for the provider
    #[error("API key not configured")]
    MissingApiKey,
}

impl LlmError {
    /// HTTP status carried by `BadResponse`, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::BadResponse(code) => Some(*code),
            _ => None,
        }
    }
}

fn status_hint(code: &u16) -> &'static str {
    match *code {
        401 | 403 => " - invalid key",
        404 => " - endpoint or model not found",
        429 => " - rate limited",
        500..=599 => " - provider server error",
        _ => "",
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
