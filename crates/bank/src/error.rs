use core::fmt::{self, Display};
use hyper::http::{self, uri::InvalidUri};
use std::io;

#[derive(Debug)]
pub enum Error {
    /// The configured endpoint does not form a valid URI.
    Uri(InvalidUri),
    /// The request could not be assembled.
    Http(http::Error),
    /// The request never completed (DNS, TCP, TLS, or protocol failure).
    Request(hyper_util::client::legacy::Error),
    /// The response body was cut short.
    Body(hyper::Error),
    /// The bank answered with a non-success HTTP status.
    Status(u16),
    /// The body was not the expected JSON schema.
    Json(serde_json::Error),
    /// The bank reported a non-zero response code.
    ResponseCode(u8),
    /// The bank succeeded but handed out no questions.
    Empty,
    /// Native root certificates could not be loaded.
    Tls(io::Error),
}

impl From<InvalidUri> for Error {
    fn from(err: InvalidUri) -> Self {
        Self::Uri(err)
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::Http(err)
    }
}

impl From<hyper_util::client::legacy::Error> for Error {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Request(err)
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Self::Body(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Tls(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri(err) => write!(f, "invalid endpoint: {err}"),
            Self::Http(err) => write!(f, "malformed request: {err}"),
            Self::Request(err) => write!(f, "request failed: {err}"),
            Self::Body(err) => write!(f, "truncated response: {err}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Json(err) => write!(f, "unexpected response: {err}"),
            Self::ResponseCode(code) => write!(f, "Code: {code}"),
            Self::Empty => f.write_str("no questions available"),
            Self::Tls(err) => write!(f, "cannot load root certificates: {err}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
