//! QNX4 and QNX6 filesystems.
//!
//! Both formats share one node and driver implementation over the
//! [`Volume`] trait. Native [`QnxError`]s are translated into
//! [`FsError`] at the [`RawNode`] boundary.

mod error;
mod qnx4;
mod qnx6;

use std::any::Any;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::stream::{ReadSeek, Run, RunReader, SharedStream};
use crate::traits::{Backend, Driver, NodeRef, RawDirIter, RawNode, probe};
use crate::{FsError, NodeKind, RawAttrs};

pub use error::QnxError;
pub use qnx4::{Extent, Qnx4Inode, Qnx4Volume};
pub use qnx6::{Qnx6Inode, Qnx6Volume};

/// One parsed QNX volume.
pub trait Volume: Send + Sync + fmt::Debug + 'static {
    /// Format-specific inode record.
    type Inode: Clone + Send + Sync + fmt::Debug + 'static;

    /// The image this volume reads from.
    fn stream(&self) -> &SharedStream;

    /// The root directory inode.
    fn root(&self) -> Result<Self::Inode, QnxError>;

    /// All stored entries of `dir`, including `.` and `..`.
    fn read_dir(&self, dir: &Self::Inode) -> Result<Vec<(String, Self::Inode)>, QnxError>;

    /// Where the inode's data lives in the image.
    fn runs(&self, inode: &Self::Inode) -> Result<Vec<Run>, QnxError>;

    /// Metadata as stored.
    fn attrs(&self, inode: &Self::Inode) -> RawAttrs;
}

/// Byte order of on-disk integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) fn u16(self, buf: &[u8], off: usize) -> u16 {
        let b = [buf[off], buf[off + 1]];
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    pub(crate) fn u32(self, buf: &[u8], off: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&buf[off..off + 4]);
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    pub(crate) fn u64(self, buf: &[u8], off: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&buf[off..off + 8]);
        match self {
            Endian::Little => u64::from_le_bytes(b),
            Endian::Big => u64::from_be_bytes(b),
        }
    }
}

/// Name bytes up to the first NUL.
pub(crate) fn c_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Merge adjacent runs so file cursors issue fewer reads.
pub(crate) fn coalesce(runs: impl IntoIterator<Item = Run>) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::new();
    for run in runs {
        push_run(&mut out, run);
    }
    out
}

/// Append `run`, merging it into the last run when they are contiguous.
pub(crate) fn push_run(runs: &mut Vec<Run>, run: Run) {
    if let Some(last) = runs.last_mut() {
        let adjacent = match (last.offset, run.offset) {
            (Some(a), Some(b)) => a + last.len == b,
            (None, None) => true,
            _ => false,
        };
        if adjacent {
            last.len += run.len;
            return;
        }
    }
    runs.push(run);
}

/// The QNX backend, detecting both QNX4 and QNX6 images.
#[derive(Debug, Clone, Copy, Default)]
pub struct QnxBackend;

impl Backend for QnxBackend {
    fn name(&self) -> &'static str {
        "qnxfs"
    }

    fn sniff(&self, stream: &mut dyn ReadSeek) -> bool {
        if probe(stream, qnx4::ROOT_OFFSET, 16).is_some_and(|b| qnx4::is_root_name(&b)) {
            return true;
        }
        qnx6::SUPERBLOCK_OFFSETS.iter().any(|&offset| {
            probe(stream, offset, 4).is_some_and(|b| qnx6::magic_endian(&b).is_some())
        })
    }

    fn mount(&self, stream: SharedStream) -> Result<Box<dyn Driver>, FsError> {
        let mut head = [0u8; 16];
        let is_qnx4 = stream
            .read_exact_at(qnx4::ROOT_OFFSET, &mut head)
            .is_ok_and(|()| qnx4::is_root_name(&head));

        if is_qnx4 {
            debug!("mounting qnx4 volume");
            let volume = Qnx4Volume::new(stream);
            return Ok(Box::new(QnxDriver::new(volume)));
        }

        let volume = Qnx6Volume::open(stream).map_err(|e| e.into_fs_error(""))?;
        debug!(?volume, "mounting qnx6 volume");
        Ok(Box::new(QnxDriver::new(volume)))
    }
}

/// Driver bound to one QNX volume.
#[derive(Debug)]
pub struct QnxDriver<V: Volume> {
    volume: Arc<V>,
}

impl<V: Volume> QnxDriver<V> {
    /// Wrap a parsed volume.
    pub fn new(volume: V) -> Self {
        Self {
            volume: Arc::new(volume),
        }
    }
}

impl<V: Volume> Driver for QnxDriver<V> {
    fn root(&self) -> Result<NodeRef, FsError> {
        let inode = self.volume.root().map_err(|e| e.into_fs_error("/"))?;
        Ok(Arc::new(QnxNode::new(self.volume.clone(), inode, "/".to_string())))
    }
}

/// One inode of a QNX volume.
pub struct QnxNode<V: Volume> {
    volume: Arc<V>,
    inode: V::Inode,
    name: String,
}

impl<V: Volume> QnxNode<V> {
    fn new(volume: Arc<V>, inode: V::Inode, name: String) -> Self {
        Self { volume, inode, name }
    }

    /// The native inode record.
    pub fn inode(&self) -> &V::Inode {
        &self.inode
    }

    fn inum(&self) -> u64 {
        self.volume.attrs(&self.inode).inode
    }

    fn reader(&self) -> Result<RunReader, QnxError> {
        let size = self.volume.attrs(&self.inode).size;
        let runs = self.volume.runs(&self.inode)?;
        Ok(RunReader::new(self.volume.stream().clone(), runs, size))
    }

    fn children(&self) -> Result<Vec<(String, V::Inode)>, QnxError> {
        if !self.is_dir() {
            return Err(QnxError::NotADirectory(self.inum()));
        }
        self.volume.read_dir(&self.inode)
    }

    fn child(&self, name: String, inode: V::Inode) -> NodeRef {
        Arc::new(QnxNode::new(self.volume.clone(), inode, name))
    }
}

impl<V: Volume> fmt::Debug for QnxNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QnxNode")
            .field("name", &self.name)
            .field("inode", &self.inode)
            .finish()
    }
}

impl<V: Volume> RawNode for QnxNode<V> {
    fn kind(&self) -> NodeKind {
        NodeKind::from_mode(self.volume.attrs(&self.inode).mode)
    }

    fn open(&self) -> Result<Box<dyn ReadSeek>, FsError> {
        let reader = self.reader().map_err(|e| e.into_fs_error(self.name.clone()))?;
        Ok(Box::new(reader))
    }

    fn iterdir(&self) -> Result<RawDirIter, FsError> {
        let children = self
            .children()
            .map_err(|e| e.into_fs_error(self.name.clone()))?;
        let nodes = children
            .into_iter()
            .map(|(name, inode)| {
                let node = self.child(name.clone(), inode);
                Ok((name, node))
            })
            .collect();
        Ok(RawDirIter::from_vec(nodes))
    }

    fn lookup(&self, name: &str) -> Result<NodeRef, FsError> {
        trace!(dir = %self.name, name, "qnx lookup");
        let found = self.children().and_then(|children| {
            children
                .into_iter()
                .find(|(child, _)| child == name)
                .ok_or_else(|| QnxError::FileNotFound(name.to_string()))
        });
        match found {
            Ok((child, inode)) => Ok(self.child(child, inode)),
            Err(e) => Err(e.into_fs_error(name)),
        }
    }

    fn link(&self) -> Result<String, FsError> {
        if !self.is_symlink() {
            return Err(QnxError::NotASymlink(self.inum()).into_fs_error(self.name.clone()));
        }
        let mut target = Vec::new();
        self.reader()
            .and_then(|mut r| r.read_to_end(&mut target).map_err(QnxError::from))
            .map_err(|e| e.into_fs_error(self.name.clone()))?;
        Ok(c_name(&target))
    }

    fn attrs(&self) -> Result<RawAttrs, FsError> {
        Ok(self.volume.attrs(&self.inode))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
