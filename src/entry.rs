//! Entries: one path resolved to one backend node.

use std::io::Read;

use tracing::trace;

use crate::filesystem::{Filesystem, join_in};
use crate::path::basename;
use crate::resolve::link_target_path;
use crate::stream::ReadSeek;
use crate::traits::{NodeRef, RawDirIter};
use crate::{ErrorKind, FsError, Reason, Stat};

/// A path inside a [`Filesystem`] together with the node it resolved to.
///
/// The path is exactly the string used to reach the node and is never
/// normalized independently. It is used for diagnostics and to build child
/// paths.
///
/// Entries are immutable; cloning one is cheap.
#[derive(Debug, Clone)]
pub struct Entry {
    fs: Filesystem,
    path: String,
    node: NodeRef,
}

impl Entry {
    /// Wrap an already-resolved node.
    pub fn new(fs: Filesystem, path: String, node: NodeRef) -> Self {
        Self { fs, path, node }
    }

    /// The filesystem this entry belongs to.
    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    /// The path used to reach this entry.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last component of [`path`](Self::path).
    pub fn name(&self) -> &str {
        basename(&self.path)
    }

    /// The backend node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Look up `path` relative to this entry.
    ///
    /// If this entry is a symlink, the lookup starts from the directory it
    /// resolves to. The child's path is `join(self.path(), path)`.
    pub fn get(&self, path: &str) -> Result<Entry, FsError> {
        let base = self.resolve(true)?;
        self.fs.get_from(&self.path, path, &base.node)
    }

    /// Follow symlinks until a non-symlink node is reached.
    ///
    /// With `follow_symlinks == false`, or if this entry is not a symlink,
    /// returns a clone of `self`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if a link in the chain dangles
    /// - [`FsError::Generic`] with [`Reason::SymlinkLoop`] once the chain
    ///   exceeds [`FsOptions::max_symlink_depth`](crate::FsOptions::max_symlink_depth)
    pub fn resolve(&self, follow_symlinks: bool) -> Result<Entry, FsError> {
        if !follow_symlinks || !self.node.is_symlink() {
            return Ok(self.clone());
        }

        let max_depth = self.fs.options().max_symlink_depth;
        let mut current = self.clone();
        for _ in 0..max_depth {
            current = current.resolve_link()?;
            if !current.node.is_symlink() {
                return Ok(current);
            }
        }
        Err(FsError::generic(self.path.clone(), Reason::SymlinkLoop))
    }

    /// The entry this symlink points to, following exactly one link.
    ///
    /// The target is looked up from the root; relative targets are taken
    /// relative to the directory holding the link.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotASymlink`] if this entry is not a symlink
    pub fn resolve_link(&self) -> Result<Entry, FsError> {
        let target = self.readlink()?;
        let path = link_target_path(&self.path, &target, self.fs.options().alt_separator);
        trace!(link = %self.path, target = %target, resolved = %path, "resolving symlink");
        self.fs.get(&path)
    }

    /// Open the content as an independent cursor at offset 0.
    ///
    /// # Errors
    ///
    /// - [`FsError::IsADirectory`] if the entry resolves to a directory
    pub fn open(&self) -> Result<Box<dyn ReadSeek>, FsError> {
        let resolved = self.resolve(true)?;
        if resolved.node.is_dir() {
            return Err(FsError::is_a_directory(self.path.clone()));
        }
        resolved
            .node
            .open()
            .map_err(|e| e.with_path(self.path.clone()))
    }

    /// Read the whole content.
    pub fn read_bytes(&self) -> Result<Vec<u8>, FsError> {
        let mut reader = self.open()?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| FsError::translate(ErrorKind::Generic, self.path.clone(), Some(Reason::Io), e))?;
        Ok(data)
    }

    /// Read the whole content as UTF-8.
    pub fn read_to_string(&self) -> Result<String, FsError> {
        let data = self.read_bytes()?;
        String::from_utf8(data).map_err(|e| {
            FsError::translate(ErrorKind::Generic, self.path.clone(), Some(Reason::InvalidData), e)
        })
    }

    /// Read and deserialize JSON content.
    #[cfg(feature = "serde")]
    pub fn read_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FsError> {
        let data = self.read_bytes()?;
        serde_json::from_slice(&data).map_err(|e| {
            FsError::translate(ErrorKind::Generic, self.path.clone(), Some(Reason::InvalidData), e)
        })
    }

    /// Names of the children, lazily, without `.` and `..`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotADirectory`] if the entry does not resolve to a directory
    pub fn iterdir(&self) -> Result<IterDir, FsError> {
        Ok(IterDir {
            inner: self.children()?,
        })
    }

    /// Child entries, lazily, without `.` and `..`.
    ///
    /// For a symlink to a directory, the children are those of the target
    /// directory, with paths built under this entry's path.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotADirectory`] if the entry does not resolve to a directory
    pub fn scandir(&self) -> Result<ScanDir, FsError> {
        Ok(ScanDir {
            fs: self.fs.clone(),
            base: self.path.clone(),
            inner: self.children()?,
        })
    }

    fn children(&self) -> Result<RawDirIter, FsError> {
        if !self.is_dir(true) {
            return Err(FsError::not_a_directory(self.path.clone()));
        }
        if self.node.is_symlink() {
            return self.resolve(true)?.children();
        }
        self.node
            .iterdir()
            .map_err(|e| e.with_path(self.path.clone()))
    }

    /// Returns `true` if the entry is a directory. Never fails: unreadable or
    /// dangling entries report `false`.
    pub fn is_dir(&self, follow_symlinks: bool) -> bool {
        self.resolve(follow_symlinks)
            .is_ok_and(|e| e.node.is_dir())
    }

    /// Returns `true` if the entry is a regular file. Never fails.
    pub fn is_file(&self, follow_symlinks: bool) -> bool {
        self.resolve(follow_symlinks)
            .is_ok_and(|e| e.node.is_file())
    }

    /// Returns `true` if this exact node is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.node.is_symlink()
    }

    /// The raw stored link target, unresolved and unnormalized.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotASymlink`] if this node is not a symlink
    pub fn readlink(&self) -> Result<String, FsError> {
        if !self.node.is_symlink() {
            return Err(FsError::not_a_symlink(self.path.clone()));
        }
        self.node
            .link()
            .map_err(|e| e.with_path(self.path.clone()))
    }

    /// Normalized metadata, following symlinks when asked.
    pub fn stat(&self, follow_symlinks: bool) -> Result<Stat, FsError> {
        self.resolve(follow_symlinks)?.lstat()
    }

    /// Normalized metadata of this exact node.
    pub fn lstat(&self) -> Result<Stat, FsError> {
        let attrs = self
            .node
            .attrs()
            .map_err(|e| e.with_path(self.path.clone()))?;
        Ok(Stat::from_raw(&attrs, self.fs.device_id()))
    }
}

fn is_dot(name: &str) -> bool {
    name == "." || name == ".."
}

/// Lazy, single-pass iterator of child names. See [`Entry::iterdir`].
#[derive(Debug)]
pub struct IterDir {
    inner: RawDirIter,
}

impl Iterator for IterDir {
    type Item = Result<String, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok((name, _)) if is_dot(&name) => continue,
                Ok((name, _)) => return Some(Ok(name)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Lazy, single-pass iterator of child entries. See [`Entry::scandir`].
#[derive(Debug)]
pub struct ScanDir {
    fs: Filesystem,
    base: String,
    inner: RawDirIter,
}

impl Iterator for ScanDir {
    type Item = Result<Entry, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok((name, _)) if is_dot(&name) => continue,
                Ok((name, node)) => {
                    let path = join_in(&self.fs, &self.base, &name);
                    return Some(Ok(Entry::new(self.fs.clone(), path, node)));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
