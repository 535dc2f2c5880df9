use thiserror::Error;

/// Transport failures surfaced by [`crate::polymarket::HttpClient`].
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("all {attempts} attempts to {method} {url} failed")]
    RetriesExhausted {
        method: &'static str,
        url: String,
        attempts: usize,
        #[source]
        last: Option<Box<HttpError>>,
    },
}

/// Username → wallet resolution failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "could not resolve Polymarket username '{0}': check that the profile exists \
         and the username is spelled correctly"
    )]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound(_))
    }
}
