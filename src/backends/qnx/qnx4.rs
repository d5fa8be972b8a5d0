//! QNX4 on-disk format.
//!
//! Little-endian, 512-byte blocks numbered from 1. Directories are arrays of
//! 64-byte entries. A plain entry holds the inode itself; a `LINK` entry
//! points at an inode stored elsewhere (every directory's own inode is the
//! first entry of its first block). File data is a list of extents that
//! continues through `xblk` blocks when it does not fit in the inode.

use chrono::{DateTime, Utc};

use super::error::corrupt;
use super::{Endian, QnxError, Volume, c_name, coalesce};
use crate::RawAttrs;
use crate::stream::{Run, SharedStream};

pub(crate) const BLOCK_SIZE: u64 = 512;
pub(crate) const ENTRY_SIZE: u64 = 64;
const ENTRIES_PER_BLOCK: u64 = BLOCK_SIZE / ENTRY_SIZE;

/// Byte offset of the root directory's own entry.
pub(crate) const ROOT_OFFSET: u64 = BLOCK_SIZE;

const STATUS_USED: u8 = 0x01;
const STATUS_LINK: u8 = 0x08;

const XBLK_SIGNATURE: &[u8; 8] = b"IamXblk\0";
const XBLK_MAX_EXTENTS: usize = 60;

const LE: Endian = Endian::Little;

/// Returns `true` if `raw` is the root entry name: `/` and 15 NULs.
pub(crate) fn is_root_name(raw: &[u8]) -> bool {
    raw.len() == 16 && raw[0] == b'/' && raw[1..].iter().all(|&b| b == 0)
}

fn block_offset(blk: u32) -> Result<u64, QnxError> {
    match blk {
        0 => Err(corrupt("block number 0")),
        n => Ok(u64::from(n - 1) * BLOCK_SIZE),
    }
}

fn timestamp(secs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(secs), 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// One extent: `blocks` blocks starting at 1-based block `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// First block.
    pub start: u32,
    /// Length in blocks.
    pub blocks: u32,
}

impl Extent {
    fn parse(buf: &[u8], off: usize) -> Self {
        Self {
            start: LE.u32(buf, off),
            blocks: LE.u32(buf, off + 4),
        }
    }

    fn run(self) -> Result<Run, QnxError> {
        Ok(Run {
            offset: Some(block_offset(self.start)?),
            len: u64::from(self.blocks) * BLOCK_SIZE,
        })
    }
}

/// A QNX4 inode entry.
#[derive(Debug, Clone)]
pub struct Qnx4Inode {
    /// Inode number: byte offset of the entry divided by 64.
    pub inum: u64,
    /// Size in bytes.
    pub size: u32,
    first_extent: Extent,
    xblk: u32,
    num_extents: u16,
    /// POSIX mode.
    pub mode: u16,
    uid: u16,
    gid: u16,
    nlink: u16,
    mtime: u32,
    atime: u32,
    ctime: u32,
}

impl Qnx4Inode {
    fn parse(buf: &[u8], inum: u64) -> Self {
        Self {
            inum,
            size: LE.u32(buf, 16),
            first_extent: Extent::parse(buf, 20),
            xblk: LE.u32(buf, 28),
            // 32: ftime, meaning unclear, not exposed
            mtime: LE.u32(buf, 36),
            atime: LE.u32(buf, 40),
            ctime: LE.u32(buf, 44),
            num_extents: LE.u16(buf, 48),
            mode: LE.u16(buf, 50),
            uid: LE.u16(buf, 52),
            gid: LE.u16(buf, 54),
            nlink: LE.u16(buf, 56),
        }
    }
}

/// A mounted QNX4 volume.
#[derive(Debug)]
pub struct Qnx4Volume {
    stream: SharedStream,
}

impl Qnx4Volume {
    /// Bind to `stream`. Nothing is read until the first lookup.
    pub fn new(stream: SharedStream) -> Self {
        Self { stream }
    }

    fn read_inode_at(&self, offset: u64) -> Result<Qnx4Inode, QnxError> {
        let mut buf = [0u8; ENTRY_SIZE as usize];
        self.stream.read_exact_at(offset, &mut buf)?;
        Ok(Qnx4Inode::parse(&buf, offset / ENTRY_SIZE))
    }

    /// Every extent of `inode`, following the `xblk` chain.
    fn extents(&self, inode: &Qnx4Inode) -> Result<Vec<Extent>, QnxError> {
        let total = usize::from(inode.num_extents);
        let mut extents = Vec::with_capacity(total);
        if total == 0 {
            return Ok(extents);
        }
        extents.push(inode.first_extent);

        let mut xblk = inode.xblk;
        while extents.len() < total {
            let mut buf = [0u8; BLOCK_SIZE as usize];
            self.stream.read_exact_at(block_offset(xblk)?, &mut buf)?;
            if &buf[496..504] != XBLK_SIGNATURE {
                return Err(corrupt(format!("bad xblk signature in block {xblk}")));
            }
            let count = usize::from(buf[8]);
            if count == 0 || count > XBLK_MAX_EXTENTS {
                return Err(corrupt(format!("xblk {xblk} holds {count} extents")));
            }
            let take = count.min(total - extents.len());
            extents.extend((0..take).map(|i| Extent::parse(&buf, 16 + i * 8)));
            xblk = LE.u32(&buf, 0);
        }
        Ok(extents)
    }
}

impl Volume for Qnx4Volume {
    type Inode = Qnx4Inode;

    fn stream(&self) -> &SharedStream {
        &self.stream
    }

    fn root(&self) -> Result<Qnx4Inode, QnxError> {
        self.read_inode_at(ROOT_OFFSET)
    }

    fn read_dir(&self, dir: &Qnx4Inode) -> Result<Vec<(String, Qnx4Inode)>, QnxError> {
        let mut remaining = u64::from(dir.size) / ENTRY_SIZE;
        let mut entries = Vec::new();

        for extent in self.extents(dir)? {
            let start = block_offset(extent.start)?;
            for blk in 0..u64::from(extent.blocks) {
                if remaining == 0 {
                    return Ok(entries);
                }
                let block_start = start + blk * BLOCK_SIZE;
                let mut buf = [0u8; BLOCK_SIZE as usize];
                self.stream.read_exact_at(block_start, &mut buf)?;

                for slot in 0..ENTRIES_PER_BLOCK.min(remaining) {
                    let off = (slot * ENTRY_SIZE) as usize;
                    let raw = &buf[off..off + ENTRY_SIZE as usize];
                    let status = raw[63];

                    if status & STATUS_LINK != 0 {
                        let name = c_name(&raw[..48]);
                        let target_blk = LE.u32(raw, 48);
                        let index = u64::from(raw[52]);
                        if index >= ENTRIES_PER_BLOCK {
                            return Err(corrupt(format!("link entry {name:?} has index {index}")));
                        }
                        let inode = self.read_inode_at(block_offset(target_blk)? + index * ENTRY_SIZE)?;
                        entries.push((name, inode));
                    } else if status & STATUS_USED != 0 {
                        let mut name = c_name(&raw[..16]);
                        if name == "/" {
                            name = ".".to_string();
                        }
                        let inode = Qnx4Inode::parse(raw, (block_start + off as u64) / ENTRY_SIZE);
                        entries.push((name, inode));
                    }
                }
                remaining = remaining.saturating_sub(ENTRIES_PER_BLOCK);
            }
        }
        Ok(entries)
    }

    fn runs(&self, inode: &Qnx4Inode) -> Result<Vec<Run>, QnxError> {
        let runs = self
            .extents(inode)?
            .into_iter()
            .map(Extent::run)
            .collect::<Result<Vec<_>, _>>()?;
        let covered: u64 = runs.iter().map(|r| r.len).sum();
        if covered < u64::from(inode.size) {
            return Err(corrupt(format!(
                "inode {} has {} bytes of extents for size {}",
                inode.inum, covered, inode.size
            )));
        }
        Ok(coalesce(runs))
    }

    fn attrs(&self, inode: &Qnx4Inode) -> RawAttrs {
        RawAttrs {
            mode: u32::from(inode.mode),
            inode: inode.inum,
            uid: u32::from(inode.uid),
            gid: u32::from(inode.gid),
            size: u64::from(inode.size),
            atime: timestamp(inode.atime),
            mtime: timestamp(inode.mtime),
            ctime: timestamp(inode.ctime),
            nlink: Some(u64::from(inode.nlink)),
        }
    }
}
