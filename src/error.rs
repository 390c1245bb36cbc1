//! Error handling for tunehouse.
//!
//! All fallible operations return [`Result`], whose error carries an
//! [`ErrorKind`] modelled after gRPC status codes plus the underlying cause.
//! The kinds that matter most to callers:
//!
//! * [`NotFound`](ErrorKind::NotFound): a party, playlist or track does not
//!   exist (anymore)
//! * [`AlreadyExists`](ErrorKind::AlreadyExists): a conflicting write, such
//!   as starting a party while a member is already in one
//! * [`Unavailable`](ErrorKind::Unavailable): the backend, the streaming
//!   provider or one of the metadata services could not deliver
//! * [`PermissionDenied`](ErrorKind::PermissionDenied) and
//!   [`Unauthenticated`](ErrorKind::Unauthenticated): the session is not
//!   allowed to perform the action
//! * [`FailedPrecondition`](ErrorKind::FailedPrecondition): the action makes
//!   no sense in the current state, for example pausing without a track
//!
//! # Example
//!
//! ```rust
//! use tunehouse::error::{Error, ErrorKind, Result};
//!
//! fn ensure_host(requester: &str, host: &str) -> Result<()> {
//!     if requester != host {
//!         return Err(Error::permission_denied("only the host can end a party"));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Error with a classification and the underlying cause.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Example
    /// ```
    /// let error = Error::from(serde_json::from_str::<u8>("x").unwrap_err());
    /// assert!(error.downcast::<std::io::Error>().is_some());
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether this error is of the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Standard result type for tunehouse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions. The HTTP status codes the backend answers
/// with are mapped onto these in [`ErrorKind::from_status`].
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// HTTP Mapping: 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// HTTP Mapping: 504 Gateway Timeout
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP Mapping: 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// HTTP Mapping: 409 Conflict
    #[error("conflicts with existing state")]
    AlreadyExists = 6,

    /// HTTP Mapping: 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP Mapping: 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// HTTP Mapping: 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// HTTP Mapping: 400 Bad Request
    #[error("out of range")]
    OutOfRange = 11,

    /// HTTP Mapping: 501 Not Implemented
    #[error("not implemented")]
    Unimplemented = 12,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// HTTP Mapping: 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,

    /// HTTP Mapping: 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,
}

impl ErrorKind {
    /// Maps an HTTP status code onto the closest error kind.
    ///
    /// Returns `None` for successful and informational codes.
    #[must_use]
    pub fn from_status(status: http::StatusCode) -> Option<Self> {
        use ErrorKind::*;

        if !status.is_client_error() && !status.is_server_error() {
            return None;
        }

        let kind = match status.as_u16() {
            400 => InvalidArgument,
            401 => Unauthenticated,
            403 => PermissionDenied,
            404 => NotFound,
            409 => AlreadyExists,
            429 => ResourceExhausted,
            499 => Cancelled,
            501 => Unimplemented,
            502 | 503 => Unavailable,
            504 => DeadlineExceeded,
            code if code >= 500 => Internal,
            _ => FailedPrecondition,
        };

        Some(kind)
    }
}

macro_rules! constructor {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "party does not exist");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    constructor!(
        /// Operation interrupted by a conflicting change.
        aborted => Aborted
    );
    constructor!(
        /// Write that conflicts with existing state, for example a second
        /// live party for the same member.
        already_exists => AlreadyExists
    );
    constructor!(
        /// Operation cancelled before completion.
        cancelled => Cancelled
    );
    constructor!(
        /// Corrupted or truncated data.
        data_loss => DataLoss
    );
    constructor!(
        /// Operation did not complete in time.
        deadline_exceeded => DeadlineExceeded
    );
    constructor!(
        /// Operation rejected because of the current state.
        ///
        /// ```rust
        /// let err = Error::failed_precondition("no active track");
        /// assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        /// ```
        failed_precondition => FailedPrecondition
    );
    constructor!(
        /// Invariant violated inside tunehouse.
        internal => Internal
    );
    constructor!(
        /// Malformed input from the caller or a remote service.
        invalid_argument => InvalidArgument
    );
    constructor!(
        /// Requested entity does not exist.
        not_found => NotFound
    );
    constructor!(
        /// Value outside its valid range.
        out_of_range => OutOfRange
    );
    constructor!(
        /// Caller is not allowed to perform the action.
        permission_denied => PermissionDenied
    );
    constructor!(
        /// Quota or rate limit exhausted.
        resource_exhausted => ResourceExhausted
    );
    constructor!(
        /// Missing or expired credentials.
        unauthenticated => Unauthenticated
    );
    constructor!(
        /// External service could not deliver; usually transient.
        ///
        /// ```rust
        /// let err = Error::unavailable("recommendation unavailable");
        /// assert_eq!(err.kind, ErrorKind::Unavailable);
        /// ```
        unavailable => Unavailable
    );
    constructor!(
        /// Operation not supported.
        unimplemented => Unimplemented
    );
    constructor!(
        /// Anything that fits no other category.
        unknown => Unknown
    );
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats as `"{kind}: {details}"`.
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Status errors keep the meaning of the HTTP status code; transport errors
/// are classified by what went wrong on the wire.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(kind) = err.status().and_then(ErrorKind::from_status) {
            return Self::new(kind, err);
        }

        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if err.is_connect() || err.is_redirect() || err.is_request() {
            return Self::unavailable(err);
        }

        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors through IO error mapping.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e)
    }
}

impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for Error {
    fn from(e: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        Self::internal(e.to_string())
    }
}
