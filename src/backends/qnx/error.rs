//! Native QNX driver errors.

use std::io;

use crate::{ErrorKind, FsError, Reason};

/// Failures raised while parsing a QNX image.
///
/// These never leave the backend: [`into_fs_error`](Self::into_fs_error)
/// translates them at the node boundary.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum QnxError {
    /// No directory entry with this name.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Directory operation on a non-directory inode.
    #[error("not a directory: inode {0}")]
    NotADirectory(u64),

    /// Link operation on a non-symlink inode.
    #[error("not a symlink: inode {0}")]
    NotASymlink(u64),

    /// On-disk structures are inconsistent.
    #[error("corrupt filesystem: {0}")]
    Corrupt(String),

    /// The image uses something this driver does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The image stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl QnxError {
    /// Exposed kind, plus the diagnostic reason for generic failures.
    fn classify(&self) -> (ErrorKind, Option<Reason>) {
        match self {
            QnxError::FileNotFound(_) => (ErrorKind::NotFound, None),
            QnxError::NotADirectory(_) => (ErrorKind::NotADirectory, None),
            QnxError::NotASymlink(_) => (ErrorKind::NotASymlink, None),
            QnxError::Corrupt(_) => (ErrorKind::Generic, Some(Reason::Corrupt)),
            QnxError::Unsupported(_) => (ErrorKind::Generic, Some(Reason::Unsupported)),
            QnxError::Io(_) => (ErrorKind::Generic, Some(Reason::Io)),
        }
    }

    /// Translate into the crate taxonomy, keeping `self` as the cause.
    pub(crate) fn into_fs_error(self, path: impl Into<String>) -> FsError {
        let (kind, reason) = self.classify();
        FsError::translate(kind, path, reason, self)
    }
}

pub(crate) fn corrupt(msg: impl Into<String>) -> QnxError {
    QnxError::Corrupt(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn translation_table() {
        let cases = [
            (QnxError::FileNotFound("x".into()), ErrorKind::NotFound, None),
            (QnxError::NotADirectory(3), ErrorKind::NotADirectory, None),
            (QnxError::NotASymlink(3), ErrorKind::NotASymlink, None),
            (corrupt("bad xblk"), ErrorKind::Generic, Some(Reason::Corrupt)),
            (QnxError::Unsupported("levels".into()), ErrorKind::Generic, Some(Reason::Unsupported)),
            (io::Error::other("gone").into(), ErrorKind::Generic, Some(Reason::Io)),
        ];
        for (native, kind, reason) in cases {
            assert_eq!(native.classify(), (kind, reason));
            let text = native.to_string();
            let err = native.into_fs_error("/p");
            assert_eq!(err.kind(), kind);
            assert_eq!(err.reason(), reason);
            assert_eq!(err.path(), "/p");
            assert_eq!(err.source().map(|s| s.to_string()), Some(text));
        }
    }
}
