//! Normalized metadata records.
//!
//! Every backend reports [`RawAttrs`]; callers only ever see [`Stat`], which
//! has the same shape regardless of which fields the on-disk format tracks.

use chrono::{DateTime, Utc};

use crate::types::{NodeKind, RawAttrs, S_IFMT};

/// Link count reported when a backend does not track one.
pub const DEFAULT_NLINK: u64 = 1;

/// Fixed-shape metadata record, modelled on POSIX `stat`.
///
/// Timestamps are seconds since the Unix epoch with a fractional part, since
/// backend time resolution varies.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stat {
    /// POSIX mode including type bits.
    pub mode: u32,
    /// Inode number.
    pub ino: u64,
    /// Device id synthesized per [`Filesystem`](crate::Filesystem) instance.
    pub dev: u64,
    /// Hard link count (1 when the backend does not track it).
    pub nlink: u64,
    /// Owner id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last access time.
    pub atime: f64,
    /// Last modification time.
    pub mtime: f64,
    /// Last status change time.
    pub ctime: f64,
}

impl Stat {
    /// Normalize backend attributes for the filesystem identified by `dev`.
    pub fn from_raw(attrs: &RawAttrs, dev: u64) -> Self {
        Self {
            mode: attrs.mode,
            ino: attrs.inode,
            dev,
            nlink: attrs.nlink.unwrap_or(DEFAULT_NLINK),
            uid: attrs.uid,
            gid: attrs.gid,
            size: attrs.size,
            atime: epoch_seconds(&attrs.atime),
            mtime: epoch_seconds(&attrs.mtime),
            ctime: epoch_seconds(&attrs.ctime),
        }
    }

    /// Node type from the `S_IFMT` bits.
    #[inline]
    pub fn file_type(&self) -> NodeKind {
        NodeKind::from_mode(self.mode)
    }

    /// Permission bits without the type.
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & !S_IFMT
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type() == NodeKind::Directory
    }

    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.file_type() == NodeKind::File
    }

    /// Returns `true` if this is a symbolic link.
    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.file_type() == NodeKind::Symlink
    }
}

fn epoch_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1e9
}
