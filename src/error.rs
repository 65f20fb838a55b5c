use thiserror::Error;

/// Failures of the API, storage and configuration layers that callers may
/// want to tell apart from plain I/O.
#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("{method} {url} returned {status}: {body}")]
    HttpStatus {
        method: &'static str,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid attachment id: {0:?}")]
    AttachmentId(String),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Turn a non-success response into an `HttpStatus` error, keeping the
    /// body for diagnostics.
    pub(crate) fn check_status(
        method: &'static str,
        resp: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, Self> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let url = resp.url().to_string();
        let body = resp.text().unwrap_or_default();
        Err(Self::HttpStatus {
            method,
            url,
            status,
            body,
        })
    }
}
