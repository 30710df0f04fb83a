//! The error kinds shared across pigeon.

use std::error;
use std::fmt;
use std::io;

/// Everything that can go wrong between reading a source and shipping its
/// series.
#[derive(Debug)]
pub enum Error {
    /// Configuration could not be accepted: a missing key, a bad duration, an
    /// unknown collector or option. Fatal at startup.
    ConfigInvalid(String),
    /// A collector option was absent when it was needed.
    OptionMissing(String),
    /// A data source could not be read. Transient.
    SourceUnavailable {
        /// The file, binary or socket that failed.
        source: String,
        /// Why it failed.
        reason: String,
    },
    /// A line of input was malformed.
    Parse(String),
    /// A tag was built with an empty key.
    EmptyKey,
    /// A tag was built with an empty value.
    EmptyValue,
    /// A counter went backwards.
    NegativeCount,
    /// Two samples of the same counter were not at least a second apart.
    NonPositiveInterval,
    /// The remote endpoint refused or failed a request. The payload is retried.
    UplinkTransient(String),
    /// The drop threshold was reached and this many series were discarded.
    UplinkExhausted(usize),
    /// The uplink channel has no receiver left.
    ChannelClosed,
    /// The owning thread was asked to shut down.
    Cancelled,
    /// Underlying I/O failure.
    Io(io::Error),
    /// Payload (de)serialization failure.
    Json(serde_json::Error),
}

impl Error {
    /// Build a `SourceUnavailable` from a path-like source and any displayable
    /// reason.
    pub fn unavailable<S, R>(source: S, reason: R) -> Error
    where
        S: Into<String>,
        R: fmt::Display,
    {
        Error::SourceUnavailable {
            source: source.into(),
            reason: reason.to_string(),
        }
    }

    /// True if this error only reports a shutdown request.
    pub fn is_cancelled(&self) -> bool {
        match *self {
            Error::Cancelled => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ConfigInvalid(ref msg) => write!(f, "invalid configuration: {}", msg),
            Error::OptionMissing(ref key) => write!(f, "missing option: {}", key),
            Error::SourceUnavailable {
                ref source,
                ref reason,
            } => write!(f, "source {} unavailable: {}", source, reason),
            Error::Parse(ref msg) => write!(f, "parse error: {}", msg),
            Error::EmptyKey => write!(f, "tag key is empty"),
            Error::EmptyValue => write!(f, "tag value is empty"),
            Error::NegativeCount => write!(f, "counter decreased"),
            Error::NonPositiveInterval => write!(f, "interval between samples is not positive"),
            Error::UplinkTransient(ref msg) => write!(f, "uplink failure: {}", msg),
            Error::UplinkExhausted(n) => write!(f, "uplink retries exhausted, dropped {} series", n),
            Error::ChannelClosed => write!(f, "series channel closed"),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Io(ref e) => write!(f, "io error: {}", e),
            Error::Json(ref e) => write!(f, "json error: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Json(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Json(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::UplinkTransient(e.to_string())
    }
}
