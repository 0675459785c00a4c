//! Collaborator client error types.

/// Errors from collaborator calls. A 4xx answer to an `is_active` lookup is
/// not an error; it is a negative answer.
#[derive(Debug, thiserror::Error)]
pub enum ProfilesError {
    /// HTTP transport error, including timeouts.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Collaborator returned an unexpected status.
    #[error("{endpoint} returned {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response body could not be decoded.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The collaborator is not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}
