//! Error taxonomy for the image filesystem core.
//!
//! Every backend-native failure is translated into one of five kinds before it
//! reaches a caller. The native error is kept as the [`source`] of the
//! translated error for diagnostics only.
//!
//! [`source`]: std::error::Error::source

use std::fmt;

/// Boxed backend-native error kept as a diagnostic cause.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The five error kinds exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Path does not exist.
    NotFound,
    /// A directory was expected.
    NotADirectory,
    /// A directory was found where a file was expected.
    IsADirectory,
    /// A symbolic link was expected.
    NotASymlink,
    /// Anything else: corruption, I/O failure, unsupported feature.
    Generic,
}

/// Internal classification of [`FsError::Generic`] failures.
///
/// This never changes the exposed kind; it only makes diagnostics clearer.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// The underlying stream failed.
    Io,
    /// On-disk structures are inconsistent.
    Corrupt,
    /// The image uses a feature the backend does not implement.
    Unsupported,
    /// A symlink chain exceeded the configured depth.
    SymlinkLoop,
    /// No registered backend recognized the stream.
    Unrecognized,
    /// File content could not be decoded as requested.
    InvalidData,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reason::Io => "i/o error",
            Reason::Corrupt => "corrupt filesystem",
            Reason::Unsupported => "unsupported",
            Reason::SymlinkLoop => "too many levels of symbolic links",
            Reason::Unrecognized => "no backend detected",
            Reason::InvalidData => "invalid data",
        })
    }
}

/// Filesystem error returned by every fallible operation in this crate.
///
/// # Examples
///
/// ```rust
/// use imagefs::{ErrorKind, FsError};
///
/// let err = FsError::not_found("/missing");
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.to_string(), "not found: /missing");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was looked up.
        path: String,
        /// The backend error this was translated from.
        #[source]
        cause: Option<Cause>,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
        /// The backend error this was translated from.
        #[source]
        cause: Option<Cause>,
    },

    /// Found a directory where a file was expected.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// The offending path.
        path: String,
        /// The backend error this was translated from.
        #[source]
        cause: Option<Cause>,
    },

    /// Expected a symbolic link but found something else.
    #[error("not a symlink: {path}")]
    NotASymlink {
        /// The offending path.
        path: String,
        /// The backend error this was translated from.
        #[source]
        cause: Option<Cause>,
    },

    /// Catch-all for corruption, I/O and unsupported features.
    #[error("{reason}: {path}")]
    Generic {
        /// The path involved, empty when no path applies.
        path: String,
        /// Diagnostic classification.
        reason: Reason,
        /// The backend error this was translated from.
        #[source]
        cause: Option<Cause>,
    },
}

impl FsError {
    /// A [`FsError::NotFound`] without a cause.
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound {
            path: path.into(),
            cause: None,
        }
    }

    /// A [`FsError::NotADirectory`] without a cause.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        FsError::NotADirectory {
            path: path.into(),
            cause: None,
        }
    }

    /// A [`FsError::IsADirectory`] without a cause.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        FsError::IsADirectory {
            path: path.into(),
            cause: None,
        }
    }

    /// A [`FsError::NotASymlink`] without a cause.
    pub fn not_a_symlink(path: impl Into<String>) -> Self {
        FsError::NotASymlink {
            path: path.into(),
            cause: None,
        }
    }

    /// A [`FsError::Generic`] without a cause.
    pub fn generic(path: impl Into<String>, reason: Reason) -> Self {
        FsError::Generic {
            path: path.into(),
            reason,
            cause: None,
        }
    }

    /// Build an error of `kind` for `path`, keeping `cause` for diagnostics.
    ///
    /// `reason` only applies to [`ErrorKind::Generic`]; a generic error
    /// without one is reported as [`Reason::Io`].
    pub fn translate<E>(
        kind: ErrorKind,
        path: impl Into<String>,
        reason: Option<Reason>,
        cause: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let path = path.into();
        let cause: Option<Cause> = Some(Box::new(cause));
        match kind {
            ErrorKind::NotFound => FsError::NotFound { path, cause },
            ErrorKind::NotADirectory => FsError::NotADirectory { path, cause },
            ErrorKind::IsADirectory => FsError::IsADirectory { path, cause },
            ErrorKind::NotASymlink => FsError::NotASymlink { path, cause },
            ErrorKind::Generic => FsError::Generic {
                path,
                reason: reason.unwrap_or(Reason::Io),
                cause,
            },
        }
    }

    /// The exposed kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::NotFound { .. } => ErrorKind::NotFound,
            FsError::NotADirectory { .. } => ErrorKind::NotADirectory,
            FsError::IsADirectory { .. } => ErrorKind::IsADirectory,
            FsError::NotASymlink { .. } => ErrorKind::NotASymlink,
            FsError::Generic { .. } => ErrorKind::Generic,
        }
    }

    /// The path this error refers to.
    pub fn path(&self) -> &str {
        match self {
            FsError::NotFound { path, .. }
            | FsError::NotADirectory { path, .. }
            | FsError::IsADirectory { path, .. }
            | FsError::NotASymlink { path, .. }
            | FsError::Generic { path, .. } => path,
        }
    }

    /// The same error reported against `path`.
    ///
    /// Nodes only know their own name; entries use this to report the full
    /// path the caller asked for.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        match &mut self {
            FsError::NotFound { path: p, .. }
            | FsError::NotADirectory { path: p, .. }
            | FsError::IsADirectory { path: p, .. }
            | FsError::NotASymlink { path: p, .. }
            | FsError::Generic { path: p, .. } => *p = path.into(),
        }
        self
    }

    /// Diagnostic reason, only present on [`FsError::Generic`].
    pub fn reason(&self) -> Option<Reason> {
        match self {
            FsError::Generic { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        FsError::Generic {
            path: String::new(),
            reason: Reason::Io,
            cause: Some(Box::new(error)),
        }
    }
}
