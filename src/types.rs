//! Core types shared between backends and the entry layer.

use chrono::{DateTime, Utc};

/// Default bound on symlink hops during one resolution.
pub const MAX_SYMLINK_DEPTH: usize = 40;

/// `S_IFMT` file type mask.
pub const S_IFMT: u32 = 0o170000;
/// `S_IFDIR` directory bits.
pub const S_IFDIR: u32 = 0o040000;
/// `S_IFREG` regular file bits.
pub const S_IFREG: u32 = 0o100000;
/// `S_IFLNK` symbolic link bits.
pub const S_IFLNK: u32 = 0o120000;

/// Type of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// FIFO, device, socket or anything the backend cannot classify.
    Other,
}

impl NodeKind {
    /// Classify a POSIX mode by its `S_IFMT` bits.
    pub const fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => NodeKind::Directory,
            S_IFREG => NodeKind::File,
            S_IFLNK => NodeKind::Symlink,
            _ => NodeKind::Other,
        }
    }
}

/// Metadata as a backend reports it, before normalization.
///
/// `nlink` is optional because not every on-disk format tracks link counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttrs {
    /// POSIX mode including type bits.
    pub mode: u32,
    /// Backend inode number.
    pub inode: u64,
    /// Owner id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last access time.
    pub atime: DateTime<Utc>,
    /// Last modification time.
    pub mtime: DateTime<Utc>,
    /// Last status change time.
    pub ctime: DateTime<Utc>,
    /// Hard link count, when the format records one.
    pub nlink: Option<u64>,
}

impl Default for RawAttrs {
    fn default() -> Self {
        Self {
            mode: S_IFREG | 0o644,
            inode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            atime: DateTime::<Utc>::UNIX_EPOCH,
            mtime: DateTime::<Utc>::UNIX_EPOCH,
            ctime: DateTime::<Utc>::UNIX_EPOCH,
            nlink: None,
        }
    }
}

/// Options controlling path handling on one [`Filesystem`](crate::Filesystem).
///
/// # Example
///
/// ```rust
/// use imagefs::FsOptions;
///
/// let opts = FsOptions::default()
///     .with_alt_separator('\\')
///     .with_max_symlink_depth(8);
/// assert_eq!(opts.alt_separator, Some('\\'));
/// assert_eq!(opts.max_symlink_depth, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FsOptions {
    /// Alternate path separator rewritten to `/` when joining paths.
    pub alt_separator: Option<char>,
    /// Maximum symlink hops in one resolution before failing.
    pub max_symlink_depth: usize,
}

impl FsOptions {
    /// Set the alternate path separator.
    pub fn with_alt_separator(mut self, sep: char) -> Self {
        self.alt_separator = Some(sep);
        self
    }

    /// Set the symlink depth bound.
    pub fn with_max_symlink_depth(mut self, depth: usize) -> Self {
        self.max_symlink_depth = depth;
        self
    }
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            alt_separator: None,
            max_symlink_depth: MAX_SYMLINK_DEPTH,
        }
    }
}
