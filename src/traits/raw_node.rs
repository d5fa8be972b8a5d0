//! The capability set every backend node exposes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::stream::ReadSeek;
use crate::{FsError, NodeKind, RawAttrs};

/// Shared handle to a backend node.
pub type NodeRef = Arc<dyn RawNode>;

/// One filesystem object as a backend sees it.
///
/// Nodes are created lazily on lookup, owned by whoever holds the
/// [`NodeRef`], and never mutated by the core. Every method returns errors
/// already translated into [`FsError`]; backend-native errors stay inside the
/// backend adapter.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Nodes read through a
/// [`SharedStream`](crate::stream::SharedStream), which serializes access to
/// the image.
///
/// # Object Safety
///
/// This trait is object-safe and is always used as `dyn RawNode`.
pub trait RawNode: Send + Sync + fmt::Debug {
    /// Node type.
    fn kind(&self) -> NodeKind;

    /// Returns `true` if this node is a directory.
    fn is_dir(&self) -> bool {
        self.kind() == NodeKind::Directory
    }

    /// Returns `true` if this node is a regular file.
    fn is_file(&self) -> bool {
        self.kind() == NodeKind::File
    }

    /// Returns `true` if this node is a symbolic link.
    fn is_symlink(&self) -> bool {
        self.kind() == NodeKind::Symlink
    }

    /// Open the node's content as an independent cursor at offset 0.
    fn open(&self) -> Result<Box<dyn ReadSeek>, FsError>;

    /// List raw children, including any `.` and `..` the format stores.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotADirectory`] if this node is not a directory
    fn iterdir(&self) -> Result<RawDirIter, FsError>;

    /// Find the child called `name`.
    ///
    /// The default implementation scans [`iterdir`](Self::iterdir). Backends
    /// with indexed directories should override it.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if there is no such child
    /// - [`FsError::NotADirectory`] if this node is not a directory
    fn lookup(&self, name: &str) -> Result<NodeRef, FsError> {
        for child in self.iterdir()? {
            let (child_name, node) = child?;
            if child_name == name {
                return Ok(node);
            }
        }
        Err(FsError::not_found(name))
    }

    /// The stored symlink target, unresolved and unnormalized.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotASymlink`] if this node is not a symlink
    fn link(&self) -> Result<String, FsError>;

    /// Metadata as the format records it.
    fn attrs(&self) -> Result<RawAttrs, FsError>;

    /// Downcast support for backends receiving a start node back from the core.
    fn as_any(&self) -> &dyn Any;
}

/// Iterator over `(name, node)` pairs of one directory.
///
/// The item `Result` reports failures reading one entry (a corrupt directory
/// block, for example) without aborting the whole listing.
pub struct RawDirIter(Box<dyn Iterator<Item = Result<(String, NodeRef), FsError>> + Send + 'static>);

impl RawDirIter {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<(String, NodeRef), FsError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(entries: Vec<Result<(String, NodeRef), FsError>>) -> Self {
        Self(Box::new(entries.into_iter()))
    }
}

impl Iterator for RawDirIter {
    type Item = Result<(String, NodeRef), FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl fmt::Debug for RawDirIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawDirIter").finish_non_exhaustive()
    }
}
