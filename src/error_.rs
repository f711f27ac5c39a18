// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

use thiserror::Error;

// imports for docs
#[allow(unused)]
use crate::driver::result_cursor::ResultCursor;
#[allow(unused)]
use crate::driver::session::Session;
#[allow(unused)]
use crate::driver::transaction::Transaction;

/// Classification of a [`DriverError`].
///
/// The kind determines how the driver treats the error:
///  * [`ErrorKind::Transient`], [`ErrorKind::SessionExpired`], and
///    [`ErrorKind::ServiceUnavailable`] are considered retryable
///    (see [`DriverError::is_retryable()`]).
///  * [`ErrorKind::Client`] and [`ErrorKind::Database`] are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller misused the driver (e.g., running a statement on a closed
    /// session, committing a terminated transaction, an unsupported URI
    /// scheme, bookmarks passed to an embedded driver).
    Client,
    /// A temporary server-side condition; retrying the work is likely to
    /// succeed.
    Transient,
    /// The session can no longer be routed to a suitable server (e.g., the
    /// cluster leader switched away underneath it).
    SessionExpired,
    /// No server could be reached to serve the request.
    ServiceUnavailable,
    /// The database engine failed to execute the statement.
    Database,
    /// The remote side violated the protocol contract. If you encounter this
    /// error, there is either a bug in the driver or in the server.
    Protocol,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Client => "client error",
            ErrorKind::Transient => "transient error",
            ErrorKind::SessionExpired => "session expired",
            ErrorKind::ServiceUnavailable => "service unavailable",
            ErrorKind::Database => "database error",
            ErrorKind::Protocol => "protocol violation",
        })
    }
}

/// Error type for everything that can go wrong while using the driver.
///
/// **Important Notes on Usage:**
///  * Error messages are *not* considered part of the driver's API.
///    They may change at any time and don't follow semantic versioning.
///  * Match on [`DriverError::kind()`] instead.
///
/// Errors that occur while cleaning up after an earlier error (e.g., a failed
/// rollback following a failed statement) are attached to the primary error as
/// suppressed errors ([`DriverError::suppressed()`]) instead of replacing it.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DriverError {
    kind: ErrorKind,
    message: String,
    suppressed: Vec<DriverError>,
}

impl DriverError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    /// See [`ErrorKind::Client`].
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Client, message)
    }

    /// See [`ErrorKind::Transient`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// See [`ErrorKind::SessionExpired`].
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionExpired, message)
    }

    /// See [`ErrorKind::ServiceUnavailable`].
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// See [`ErrorKind::Database`].
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// See [`ErrorKind::Protocol`].
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// A [`ErrorKind::Client`] error for operations the targeted backend does
    /// not (yet) support.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Client,
            format!("unsupported operation: {}", message.into()),
        )
    }

    pub(crate) fn terminated() -> Self {
        Self::client("the transaction has been terminated")
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a retry policy may re-run the work that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transient | ErrorKind::SessionExpired | ErrorKind::ServiceUnavailable
        )
    }

    /// Attach a secondary error without replacing this one.
    pub fn add_suppressed(&mut self, error: DriverError) {
        self.suppressed.push(error);
    }

    pub(crate) fn with_suppressed(mut self, error: DriverError) -> Self {
        self.add_suppressed(error);
        self
    }

    /// Errors that occurred after this one but would have hidden it.
    pub fn suppressed(&self) -> &[DriverError] {
        &self.suppressed
    }

    pub(crate) fn is_fatal_during_discovery(&self) -> bool {
        matches!(self.kind, ErrorKind::Client | ErrorKind::Database)
    }
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for suppressed in &self.suppressed {
            write!(f, "\nsuppressed: {suppressed}")?;
        }
        Ok(())
    }
}

impl StdError for DriverError {}

/// Used when navigating a [`ResultCursor`] made assumptions about the number
/// of records that did not hold.
///
/// See [`ResultCursor::single()`] and [`ResultCursor::peek()`].
#[derive(Debug, Error)]
pub enum NoSuchRecordError {
    #[error("no records were found")]
    NoRecords,
    #[error("more than one record was found")]
    TooManyRecords,
}

impl From<NoSuchRecordError> for DriverError {
    fn from(err: NoSuchRecordError) -> Self {
        DriverError::client(format!("no such record: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    #[rstest]
    #[case(DriverError::transient("t"), true)]
    #[case(DriverError::session_expired("se"), true)]
    #[case(DriverError::service_unavailable("su"), true)]
    #[case(DriverError::client("c"), false)]
    #[case(DriverError::database("d"), false)]
    #[case(DriverError::protocol_violation("p"), false)]
    fn retryable_classification(#[case] error: DriverError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }

    #[rstest]
    fn suppressed_errors_keep_the_primary(#[values(0, 1, 3)] count: usize) {
        let mut error = DriverError::database("primary");
        for i in 0..count {
            error.add_suppressed(DriverError::client(format!("secondary {i}")));
        }

        assert_eq!(error.kind(), ErrorKind::Database);
        assert_eq!(error.message(), "primary");
        assert_eq!(error.suppressed().len(), count);
        let rendered = error.to_string();
        assert!(rendered.starts_with("database error: primary"));
        assert_eq!(rendered.matches("suppressed:").count(), count);
    }

    #[rstest]
    fn no_such_record_maps_to_client_error() {
        let error: DriverError = NoSuchRecordError::NoRecords.into();
        assert_eq!(error.kind(), ErrorKind::Client);
    }
}
