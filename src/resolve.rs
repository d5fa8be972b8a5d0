//! Path walking and symlink target computation.
//!
//! Both are bounded: a corrupt or cyclic image fails with
//! [`Reason::SymlinkLoop`] after a fixed number of hops instead of hanging.

use std::collections::VecDeque;

use tracing::trace;

use crate::path::{components, dirname, join, normalize, normalize_separators};
use crate::traits::{Driver, NodeRef};
use crate::{ErrorKind, FsError, Reason};

/// Walk `path` segment by segment through `driver`.
///
/// Absolute paths start at the root; relative paths start at `start` when
/// given, else at the root. `.` is skipped. `..` returns to the previously
/// walked directory, or asks the node for its stored `..` entry when the walk
/// began above it. Symlinks met on intermediate components are followed:
/// absolute targets restart at the root, relative targets continue from the
/// directory holding the link. A symlink as the final component is returned
/// unresolved.
///
/// # Errors
///
/// - [`FsError::NotFound`] if a component does not exist
/// - [`FsError::NotADirectory`] if a component before the last is not a directory
/// - [`FsError::Generic`] with [`Reason::SymlinkLoop`] after more than
///   `max_symlink_depth` intermediate symlinks
pub fn walk<D: Driver + ?Sized>(
    driver: &D,
    path: &str,
    start: Option<&NodeRef>,
    max_symlink_depth: usize,
) -> Result<NodeRef, FsError> {
    let mut current = match start {
        Some(node) if !path.starts_with('/') => node.clone(),
        _ => driver.root()?,
    };
    let mut parents: Vec<NodeRef> = Vec::new();
    let mut pending: VecDeque<String> = components(path).map(str::to_string).collect();
    let mut hops = 0usize;

    while let Some(name) = pending.pop_front() {
        match name.as_str() {
            "." => continue,
            ".." => {
                if let Some(parent) = parents.pop() {
                    current = parent;
                } else if current.is_dir() {
                    match current.lookup("..") {
                        Ok(parent) => current = parent,
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
                continue;
            }
            _ => {}
        }

        if !current.is_dir() {
            return Err(FsError::not_a_directory(path));
        }

        let child = current.lookup(&name).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound {
                path: path.to_string(),
                cause: Some(Box::new(e)),
            },
            _ => e,
        })?;

        if child.is_symlink() && !pending.is_empty() {
            hops += 1;
            if hops > max_symlink_depth {
                return Err(FsError::generic(path, Reason::SymlinkLoop));
            }
            let target = child.link()?;
            trace!(path, component = %name, target = %target, hops, "following intermediate symlink");
            if target.starts_with('/') {
                current = driver.root()?;
                parents.clear();
            }
            for part in components(&target).collect::<Vec<_>>().into_iter().rev() {
                pending.push_front(part.to_string());
            }
            continue;
        }

        parents.push(std::mem::replace(&mut current, child));
    }

    Ok(current)
}

/// The absolute-or-relative path a symlink at `link_path` points to.
///
/// Relative targets are taken relative to the directory holding the link;
/// the result is lexically normalized so it can be looked up from the root.
///
/// ```rust
/// use imagefs::resolve::link_target_path;
///
/// assert_eq!(link_target_path("/usr/lib/libc.so", "../../lib/libc.so.6", None), "/lib/libc.so.6");
/// assert_eq!(link_target_path("/bin", "/usr/bin", None), "/usr/bin");
/// ```
pub fn link_target_path(link_path: &str, target: &str, alt_separator: Option<char>) -> String {
    let target = normalize_separators(target, alt_separator);
    if target.starts_with('/') {
        normalize(&target)
    } else {
        let link_path = normalize_separators(link_path, alt_separator);
        normalize(&join(dirname(&link_path), &target, None))
    }
}
