use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The host could not be reached: no route, DNS failure, timeout or a
    /// connection dropped mid-request.
    #[error("Connection unavailable: {0}")]
    Connectivity(String),

    #[error("No response: {0}")]
    NoResponse(#[source] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No result: {0}")]
    NoResult(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::Status {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    /// Sort a transport failure into connectivity loss or a plain missing response.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            ApiError::Connectivity(err.to_string())
        } else {
            ApiError::NoResponse(err)
        }
    }

    /// A failure while reading the body of a response that already started.
    ///
    /// reqwest reports a connection closed mid-body as a body or decode error;
    /// either way the host went away, so it counts as connectivity loss.
    pub fn from_body(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            ApiError::Connectivity(format!("connection lost while reading response: {}", err))
        } else {
            Self::from_transport(err)
        }
    }

    /// Whether this failure means the catalog host is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Connectivity(_))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::NoResult(format!("malformed JSON: {}", err))
    }
}
