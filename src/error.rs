//! Error types. Internally the crate passes `anyhow` errors around (`Res`). At the boundaries,
//! where a caller needs to know what kind of failure happened, errors are classified with an
//! `ErrorType` and become the public `Error`.

use hyper::StatusCode;
use std::fmt::{Debug, Display, Formatter};

/// The internal result type.
pub(crate) type Res<T> = anyhow::Result<T>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies an error so that it can be reported correctly, e.g. as an HTTP status.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorType {
    /// The request was missing a parameter or a parameter was malformed.
    Request,
    /// A document, worksheet or required column does not exist.
    NotFound,
    /// The configuration or home directory is broken.
    Config,
    /// Talking to the spreadsheet service failed.
    Sheets,
    /// Talking to the cache failed.
    Cache,
    /// Anything else.
    Internal,
}

impl ErrorType {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorType::Request => StatusCode::BAD_REQUEST,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Config
            | ErrorType::Sheets
            | ErrorType::Cache
            | ErrorType::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The public error type: an `anyhow::Error` along with its `ErrorType`.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    /// Creates an `ErrorType::Request` error with `message`.
    pub fn request(message: impl Display) -> Self {
        Self::new(ErrorType::Request, anyhow::anyhow!("{message}"))
    }

    /// Creates an `ErrorType::NotFound` error with `message`.
    pub fn not_found(message: impl Display) -> Self {
        Self::new(ErrorType::NotFound, anyhow::anyhow!("{message}"))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn status(&self) -> StatusCode {
        self.error_type.status()
    }

    /// The message that is safe to show to an HTTP client. Server-side failures are reported
    /// generically, the detail goes to the log.
    pub fn public_message(&self) -> String {
        match self.error_type {
            ErrorType::Request | ErrorType::NotFound => self.inner.to_string(),
            _ => String::from("Internal Server Error"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {:?}", self.error_type, self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for Error {
    fn from(inner: anyhow::Error) -> Self {
        Self::new(ErrorType::Internal, inner)
    }
}

/// Converts internal results into public results with an `ErrorType`.
pub trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorType::Request.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorType::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorType::Cache.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_public_message_hides_internal_detail() {
        let e = Error::from(anyhow::anyhow!("connection refused at 10.0.0.7"));
        assert_eq!(e.public_message(), "Internal Server Error");
        assert!(e.to_string().contains("10.0.0.7"));

        let e = Error::not_found("Worksheet 'May 2024' not found");
        assert_eq!(e.public_message(), "Worksheet 'May 2024' not found");
    }

    #[test]
    fn test_pub_result() {
        let r: std::result::Result<(), anyhow::Error> = Err(anyhow::anyhow!("nope"));
        let e = r.pub_result(ErrorType::Sheets).unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Sheets);
    }
}
