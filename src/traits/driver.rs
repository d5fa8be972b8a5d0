//! Format drivers bound to one image.

use std::fmt;

use crate::traits::NodeRef;
use crate::{FsError, resolve};

/// A format-specific engine bound to one opened image.
///
/// A driver only has to hand out its root directory. Path lookups default to
/// the shared segment walker in [`resolve::walk`], which follows intermediate
/// symlinks with a bounded hop count. Drivers with a faster native lookup can
/// override [`get`](Self::get).
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods take `&self`.
pub trait Driver: Send + Sync + fmt::Debug {
    /// The root directory node.
    fn root(&self) -> Result<NodeRef, FsError>;

    /// Resolve `path` to a node.
    ///
    /// Absolute paths, and any path when `start` is `None`, walk from the
    /// root. Relative paths with a `start` node walk from that directory.
    /// A symlink as the final component is returned as-is.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if a component does not exist
    /// - [`FsError::NotADirectory`] if an intermediate component is not a directory
    /// - [`FsError::Generic`] for corruption, I/O failure or symlink loops
    fn get(
        &self,
        path: &str,
        start: Option<&NodeRef>,
        max_symlink_depth: usize,
    ) -> Result<NodeRef, FsError> {
        resolve::walk(self, path, start, max_symlink_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_is_object_safe() {
        fn _check(_: &dyn Driver) {}
    }

    #[test]
    fn driver_requires_send_sync() {
        fn _assert_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_send_sync::<dyn Driver>();
    }
}
