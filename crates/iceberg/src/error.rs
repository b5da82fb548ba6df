// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

use chrono::{DateTime, TimeZone as _, Utc};

/// Result that is a wrapper of `Result<T, iceberg_commit::Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// ErrorKind is all kinds of Error raised while producing a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The operation was rejected because the caller misused the API or the
    /// table is not in a state required for the operation.
    ///
    /// Unknown partition spec ids, non-positive parallelism and appending a
    /// delete manifest all end up here. These are never retried.
    PreconditionFailed,

    /// Something unexpected happened, usually while doing I/O against the
    /// underlying storage.
    Unexpected,

    /// Table metadata or a manifest is invalid or inconsistent.
    DataInvalid,

    /// The requested feature is not supported by the table format version.
    FeatureUnsupported,

    /// A commit validation failed.
    ///
    /// Raised when a concurrent commit conflicts with the pending change, when
    /// the snapshot history cannot be verified, or when a strict-mode filter
    /// rejects a delete. The whole operation may be retried against a fresh
    /// table state.
    ValidationFailed,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::PreconditionFailed => "PreconditionFailed",
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::DataInvalid => "DataInvalid",
            ErrorKind::FeatureUnsupported => "FeatureUnsupported",
            ErrorKind::ValidationFailed => "ValidationFailed",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// Error is the error struct returned by all functions of this crate.
///
/// ## Display
///
/// - Via `Display`, the error is printed in a single line:
///
/// ```shell
/// ValidationFailed, context: { starting snapshot: 1 } => Cannot determine history, source: ...
/// ```
///
/// - Via `Debug`, the error is printed over multiple lines with its context,
///   source and backtrace (if captured).
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<anyhow::Error>,
    backtrace: Backtrace,

    retryable: bool,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            de.field("backtrace", &self.backtrace);
            de.field("retryable", &self.retryable);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source: {source:#}")?;
        }

        if self.backtrace.status() == BacktraceStatus::Captured {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{}", self.backtrace)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::default(),

            source: None,
            // Zero cost unless RUST_BACKTRACE is set.
            backtrace: Backtrace::capture(),

            retryable: false,
        }
    }

    /// Create a validation failure.
    ///
    /// Validation failures describe a conflict with the current table state, so
    /// they are marked retryable: the caller may rebuild the pending change on
    /// top of a refreshed table and try again.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message).with_retryable(true)
    }

    /// Set retryable of the error.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(src.into());
        self
    }

    #[cfg(test)]
    fn with_backtrace(mut self, backtrace: Backtrace) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Return error's backtrace.
    ///
    /// If you just want to print error with backtrace, use `Debug`, like `format!("{err:?}")`.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's retryable status
    pub fn retryable(&self) -> bool {
        self.retryable
    }

    /// Return error's message.
    #[inline]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

macro_rules! define_from_err {
    ($source: path, $error_kind: path, $msg: expr) => {
        impl std::convert::From<$source> for crate::error::Error {
            fn from(v: $source) -> Self {
                Self::new($error_kind, $msg).with_source(v)
            }
        }
    };
}

define_from_err!(
    core::num::ParseIntError,
    ErrorKind::DataInvalid,
    "parsing integer from string"
);

define_from_err!(
    std::str::ParseBoolError,
    ErrorKind::DataInvalid,
    "parsing boolean from string"
);

define_from_err!(
    uuid::Error,
    ErrorKind::DataInvalid,
    "Failed to convert between uuid and string"
);

define_from_err!(
    serde_json::Error,
    ErrorKind::DataInvalid,
    "Failed to encode or decode json metadata"
);

define_from_err!(
    crate::spec::DataFileBuilderError,
    ErrorKind::DataInvalid,
    "Failed to build data file"
);

define_from_err!(std::io::Error, ErrorKind::Unexpected, "IO Operation failed");

/// Converts a timestamp in milliseconds to `DateTime<Utc>`, handling errors.
pub(crate) fn timestamp_ms_to_utc(timestamp_ms: i64) -> Result<DateTime<Utc>> {
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(t) => Ok(t),
        chrono::LocalResult::Ambiguous(_, _) => Err(Error::new(
            ErrorKind::Unexpected,
            "Ambiguous timestamp with two possible results",
        )),
        chrono::LocalResult::None => Err(Error::new(ErrorKind::DataInvalid, "Invalid timestamp")),
    }
    .map_err(|e| e.with_context("timestamp value", timestamp_ms.to_string()))
}

/// Helper macro to check arguments.
///
/// Following example check `a > 0`, otherwise returns a `PreconditionFailed` error.
/// ```ignore
/// ensure_precondition!(a > 0, "{} is not positive.", a);
/// ```
#[macro_export]
macro_rules! ensure_precondition {
    ($cond: expr, $fmt: literal, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::Error::new($crate::ErrorKind::PreconditionFailed, format!($fmt, $($arg)*)))
        }
    };
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    use super::*;

    fn generate_error(backtrace: Backtrace) -> Error {
        Error::validation("Found conflicting files")
            .with_context("starting snapshot", "1")
            .with_context("partitions", "[0: (a)]")
            .with_source(anyhow!("manifest read failed"))
            .with_backtrace(backtrace)
    }

    #[test]
    fn test_error_display_without_backtrace() {
        let s = format!("{}", generate_error(Backtrace::disabled()));
        assert_eq!(
            s,
            r#"ValidationFailed, context: { starting snapshot: 1, partitions: [0: (a)] } => Found conflicting files, source: manifest read failed"#
        )
    }

    #[test]
    fn test_error_debug_without_backtrace() {
        let s = format!("{:?}", generate_error(Backtrace::disabled()));
        assert_eq!(
            s,
            r#"ValidationFailed => Found conflicting files

Context:
   starting snapshot: 1
   partitions: [0: (a)]

Source: manifest read failed
"#
        )
    }

    #[test]
    fn test_error_debug_with_backtrace() {
        let s = format!("{:?}", generate_error(Backtrace::force_capture()));

        let expected = r#"ValidationFailed => Found conflicting files

Context:
   starting snapshot: 1
   partitions: [0: (a)]

Source: manifest read failed

Backtrace:
   0:"#;
        assert_eq!(&s[..expected.len()], expected);
    }

    #[test]
    fn test_validation_errors_are_retryable() {
        let err = Error::validation("Cannot commit, missing data files: a.parquet");
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.retryable());

        let err = Error::new(ErrorKind::PreconditionFailed, "Cannot find partition spec 7");
        assert!(!err.retryable());
    }

    #[test]
    fn test_ensure_precondition() {
        fn check(parallelism: usize) -> Result<()> {
            ensure_precondition!(parallelism > 0, "Invalid parallelism: {}", parallelism);
            Ok(())
        }

        assert!(check(4).is_ok());
        let err = check(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.message(), "Invalid parallelism: 0");
    }
}
