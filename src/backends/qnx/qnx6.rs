//! QNX6 on-disk format.
//!
//! The superblock sits at 0x2000 (after a boot block) or at 0, and its magic
//! decides the byte order of every integer on the volume. The data area
//! starts 0x1000 bytes after the superblock. A second superblock follows the
//! data area; whichever has the higher serial is current.
//!
//! Inodes, long file names and file contents are all stored in block trees:
//! up to 16 top-level pointers with `levels` layers of indirect pointer
//! blocks below them.

use std::io::{BufReader, Read};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::error::corrupt;
use super::{Endian, QnxError, Volume, c_name, push_run};
use crate::RawAttrs;
use crate::stream::{Run, RunReader, SharedStream};

pub(crate) const MAGIC: u32 = 0x6819_1122;

/// Candidate superblock offsets, in probing order.
pub(crate) const SUPERBLOCK_OFFSETS: [u64; 2] = [0x2000, 0];

const SUPERBLOCK_AREA: u64 = 0x1000;
const SUPERBLOCK_SIZE: usize = 512;
const INODE_SIZE: u64 = 128;
const DIR_ENTRY_SIZE: usize = 32;
/// Directory entries buffered per read.
const DIR_CHUNK: usize = DIR_ENTRY_SIZE * 128;
const SHORT_NAME_MAX: usize = 27;
const LONG_NAME_MAX: usize = 510;
const ROOT_INODE: u32 = 1;
const POINTERS: usize = 16;
const MAX_LEVELS: u8 = 5;
const SPARSE: u32 = 0xFFFF_FFFF;

/// Byte order announced by a superblock magic, if it is one.
pub(crate) fn magic_endian(raw: &[u8]) -> Option<Endian> {
    if raw.len() < 4 {
        return None;
    }
    [Endian::Little, Endian::Big]
        .into_iter()
        .find(|e| e.u32(raw, 0) == MAGIC)
}

fn timestamp(secs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(secs), 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Root of a block tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockTree {
    size: u64,
    ptrs: [u32; POINTERS],
    levels: u8,
}

impl BlockTree {
    fn parse(endian: Endian, buf: &[u8], off: usize, ptrs_at: usize, levels_at: usize) -> Self {
        let mut ptrs = [0u32; POINTERS];
        for (i, p) in ptrs.iter_mut().enumerate() {
            *p = endian.u32(buf, off + ptrs_at + i * 4);
        }
        Self {
            size: endian.u64(buf, off),
            ptrs,
            levels: buf[off + levels_at],
        }
    }
}

#[derive(Debug, Clone)]
struct Superblock {
    endian: Endian,
    serial: u64,
    blocksize: u32,
    num_inodes: u32,
    num_blocks: u32,
    inodes: BlockTree,
    longfile: BlockTree,
}

impl Superblock {
    fn parse(buf: &[u8]) -> Result<Self, QnxError> {
        let endian = magic_endian(buf).ok_or_else(|| corrupt("bad qnx6 superblock magic"))?;
        let blocksize = endian.u32(buf, 48);
        if !blocksize.is_power_of_two() || !(512..=65536).contains(&blocksize) {
            return Err(corrupt(format!("invalid block size {blocksize}")));
        }
        Ok(Self {
            endian,
            serial: endian.u64(buf, 8),
            blocksize,
            num_inodes: endian.u32(buf, 52),
            num_blocks: endian.u32(buf, 60),
            inodes: BlockTree::parse(endian, buf, 72, 8, 72),
            // 152: block bitmap tree, unused read-only
            longfile: BlockTree::parse(endian, buf, 232, 8, 72),
        })
    }
}

/// A QNX6 inode.
#[derive(Debug, Clone)]
pub struct Qnx6Inode {
    /// Inode number, starting at 1 for the root.
    pub inum: u32,
    tree: BlockTree,
    uid: u32,
    gid: u32,
    mtime: u32,
    atime: u32,
    ctime: u32,
    /// POSIX mode.
    pub mode: u16,
    /// Allocation status byte.
    pub status: u8,
}

impl Qnx6Inode {
    fn parse(endian: Endian, buf: &[u8], inum: u32) -> Self {
        Self {
            inum,
            tree: BlockTree::parse(endian, buf, 0, 36, 100),
            uid: endian.u32(buf, 8),
            gid: endian.u32(buf, 12),
            // 16: ftime, meaning unclear, not exposed
            mtime: endian.u32(buf, 20),
            atime: endian.u32(buf, 24),
            ctime: endian.u32(buf, 28),
            mode: endian.u16(buf, 32),
            status: buf[101],
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.tree.size
    }
}

/// A mounted QNX6 volume.
pub struct Qnx6Volume {
    stream: SharedStream,
    sb: Superblock,
    data_start: u64,
    ptr_bits: u32,
    /// Blocks that physically fit in the image after `data_start`.
    image_blocks: u64,
}

impl std::fmt::Debug for Qnx6Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Qnx6Volume")
            .field("endian", &self.sb.endian)
            .field("serial", &self.sb.serial)
            .field("blocksize", &self.sb.blocksize)
            .field("num_inodes", &self.sb.num_inodes)
            .field("num_blocks", &self.sb.num_blocks)
            .field("data_start", &self.data_start)
            .field("image_blocks", &self.image_blocks)
            .finish()
    }
}

impl Qnx6Volume {
    /// Locate and parse the superblocks of `stream`.
    ///
    /// # Errors
    ///
    /// - [`QnxError::Unsupported`] if no superblock magic is found
    /// - [`QnxError::Corrupt`] if the superblock is inconsistent
    pub fn open(stream: SharedStream) -> Result<Self, QnxError> {
        let mut found = None;
        for offset in SUPERBLOCK_OFFSETS {
            let mut buf = [0u8; SUPERBLOCK_SIZE];
            if stream.read_exact_at(offset, &mut buf).is_ok() && magic_endian(&buf).is_some() {
                found = Some((offset, Superblock::parse(&buf)?));
                break;
            }
        }
        let (sb_offset, mut sb) =
            found.ok_or_else(|| QnxError::Unsupported("no qnx6 superblock".to_string()))?;
        let data_start = sb_offset + SUPERBLOCK_AREA;

        let backup_offset = u64::from(sb.num_blocks)
            .checked_mul(u64::from(sb.blocksize))
            .and_then(|n| n.checked_add(data_start));
        match backup_offset.map(|off| Self::read_superblock(&stream, off)) {
            Some(Ok(backup)) if backup.serial > sb.serial => {
                debug!(primary = sb.serial, backup = backup.serial, "using backup qnx6 superblock");
                sb = backup;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!(error = %e, "backup qnx6 superblock unreadable"),
            None => warn!("backup qnx6 superblock offset overflows"),
        }

        let ptr_bits = (sb.blocksize / 4).trailing_zeros();
        let image_blocks = stream.size()?.saturating_sub(data_start) / u64::from(sb.blocksize);
        Ok(Self {
            stream,
            sb,
            data_start,
            ptr_bits,
            image_blocks,
        })
    }

    fn read_superblock(stream: &SharedStream, offset: u64) -> Result<Superblock, QnxError> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        stream.read_exact_at(offset, &mut buf)?;
        Superblock::parse(&buf)
    }

    fn blocksize(&self) -> u64 {
        u64::from(self.sb.blocksize)
    }

    fn block_offset(&self, ptr: u32) -> Option<u64> {
        (ptr != SPARSE).then(|| self.data_start + u64::from(ptr) * self.blocksize())
    }

    /// Image offset of logical block `index` of `tree`, `None` if sparse.
    fn map_block(&self, tree: &BlockTree, index: u64) -> Result<Option<u64>, QnxError> {
        if tree.levels > MAX_LEVELS {
            return Err(QnxError::Unsupported(format!("{} block tree levels", tree.levels)));
        }
        let levels = u32::from(tree.levels);
        let top = index.checked_shr(self.ptr_bits * levels).unwrap_or(0);
        let mut ptr = *tree
            .ptrs
            .get(top as usize)
            .ok_or_else(|| corrupt(format!("block {index} beyond block tree")))?;

        let mask = (1u64 << self.ptr_bits) - 1;
        for level in (0..levels).rev() {
            let Some(table) = self.block_offset(ptr) else {
                return Ok(None);
            };
            let slot = index.checked_shr(self.ptr_bits * level).unwrap_or(0) & mask;
            let mut raw = [0u8; 4];
            self.stream.read_exact_at(table + slot * 4, &mut raw)?;
            ptr = self.sb.endian.u32(&raw, 0);
        }
        Ok(self.block_offset(ptr))
    }

    fn block_count(&self, size: u64) -> Result<u64, QnxError> {
        let count = size.div_ceil(self.blocksize());
        if count > u64::from(self.sb.num_blocks) {
            return Err(corrupt(format!("size {size} exceeds the volume")));
        }
        Ok(count)
    }

    /// Data runs of `tree`, merged as they are found.
    ///
    /// A sparse pointer covers its whole subtree in one step, and every
    /// allocated block visited is charged against the image size, so the work
    /// is bounded by the image rather than by the sizes it claims.
    fn tree_runs(&self, tree: &BlockTree) -> Result<Vec<Run>, QnxError> {
        if tree.levels > MAX_LEVELS {
            return Err(QnxError::Unsupported(format!("{} block tree levels", tree.levels)));
        }
        let mut walk = TreeWalk {
            runs: Vec::new(),
            remaining: self.block_count(tree.size)?,
            budget: self.image_blocks,
        };
        for &ptr in &tree.ptrs {
            if walk.remaining == 0 {
                break;
            }
            self.walk_tree(ptr, u32::from(tree.levels), &mut walk)?;
        }
        if walk.remaining > 0 {
            return Err(corrupt(format!("size {} beyond block tree", tree.size)));
        }
        Ok(walk.runs)
    }

    fn walk_tree(&self, ptr: u32, level: u32, walk: &mut TreeWalk) -> Result<(), QnxError> {
        let bs = self.blocksize();
        let Some(offset) = self.block_offset(ptr) else {
            let span = 1u64
                .checked_shl(self.ptr_bits * level)
                .unwrap_or(u64::MAX)
                .min(walk.remaining);
            walk.remaining -= span;
            push_run(&mut walk.runs, Run { offset: None, len: span * bs });
            return Ok(());
        };
        if walk.budget == 0 {
            return Err(corrupt("block tree claims more blocks than the image holds"));
        }
        walk.budget -= 1;

        if level == 0 {
            walk.remaining -= 1;
            push_run(&mut walk.runs, Run { offset: Some(offset), len: bs });
            return Ok(());
        }
        let table = self.stream.read_vec_at(offset, bs as usize)?;
        for raw in table.chunks_exact(4) {
            if walk.remaining == 0 {
                break;
            }
            self.walk_tree(self.sb.endian.u32(raw, 0), level - 1, walk)?;
        }
        Ok(())
    }

    fn read_inode(&self, inum: u32) -> Result<Qnx6Inode, QnxError> {
        if inum == 0 || inum > self.sb.num_inodes {
            return Err(corrupt(format!("inode {inum} out of range")));
        }
        let pos = u64::from(inum - 1) * INODE_SIZE;
        let block = self
            .map_block(&self.sb.inodes, pos / self.blocksize())?
            .ok_or_else(|| corrupt(format!("inode {inum} in a sparse block")))?;
        let mut buf = [0u8; INODE_SIZE as usize];
        self.stream
            .read_exact_at(block + pos % self.blocksize(), &mut buf)?;
        Ok(Qnx6Inode::parse(self.sb.endian, &buf, inum))
    }

    fn read_long_name(&self, index: u32) -> Result<String, QnxError> {
        let block = self
            .map_block(&self.sb.longfile, u64::from(index))?
            .ok_or_else(|| corrupt(format!("long name {index} in a sparse block")))?;
        let mut len_raw = [0u8; 2];
        self.stream.read_exact_at(block, &mut len_raw)?;
        let len = usize::from(self.sb.endian.u16(&len_raw, 0));
        if len > LONG_NAME_MAX || len + 2 > self.sb.blocksize as usize {
            return Err(corrupt(format!("long name {index} has length {len}")));
        }
        let raw = self.stream.read_vec_at(block + 2, len)?;
        Ok(c_name(&raw))
    }

}

/// Progress of one block tree traversal.
struct TreeWalk {
    runs: Vec<Run>,
    /// Logical blocks still to map.
    remaining: u64,
    /// Allocated blocks that may still be visited.
    budget: u64,
}

impl Volume for Qnx6Volume {
    type Inode = Qnx6Inode;

    fn stream(&self) -> &SharedStream {
        &self.stream
    }

    fn root(&self) -> Result<Qnx6Inode, QnxError> {
        self.read_inode(ROOT_INODE)
    }

    fn read_dir(&self, dir: &Qnx6Inode) -> Result<Vec<(String, Qnx6Inode)>, QnxError> {
        let size = dir.tree.size;
        // At most one entry per inode plus "." and "..".
        let limit = (u64::from(self.sb.num_inodes) + 2) * DIR_ENTRY_SIZE as u64;
        if size > limit.next_multiple_of(self.blocksize()) {
            return Err(corrupt(format!("directory size {size} exceeds the inode count")));
        }

        let reader = RunReader::new(self.stream.clone(), self.tree_runs(&dir.tree)?, size);
        let mut reader = BufReader::with_capacity(DIR_CHUNK, reader);
        let endian = self.sb.endian;
        let mut entries = Vec::new();
        let mut raw = [0u8; DIR_ENTRY_SIZE];

        for _ in 0..size / DIR_ENTRY_SIZE as u64 {
            reader.read_exact(&mut raw)?;
            let inum = endian.u32(&raw, 0);
            if inum == 0 {
                continue;
            }
            let len = usize::from(raw[4]);
            let name = if len <= SHORT_NAME_MAX {
                c_name(&raw[5..5 + len])
            } else {
                self.read_long_name(endian.u32(&raw, 8))?
            };
            entries.push((name, self.read_inode(inum)?));
        }
        Ok(entries)
    }

    fn runs(&self, inode: &Qnx6Inode) -> Result<Vec<Run>, QnxError> {
        self.tree_runs(&inode.tree)
    }

    fn attrs(&self, inode: &Qnx6Inode) -> RawAttrs {
        RawAttrs {
            mode: u32::from(inode.mode),
            inode: u64::from(inode.inum),
            uid: inode.uid,
            gid: inode.gid,
            size: inode.tree.size,
            atime: timestamp(inode.atime),
            mtime: timestamp(inode.mtime),
            ctime: timestamp(inode.ctime),
            nlink: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn superblock(endian: Endian, blocksize: u32) -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        let put32 = |buf: &mut Vec<u8>, off: usize, v: u32| {
            let b = match endian {
                Endian::Little => v.to_le_bytes(),
                Endian::Big => v.to_be_bytes(),
            };
            buf[off..off + 4].copy_from_slice(&b);
        };
        put32(&mut buf, 0, MAGIC);
        put32(&mut buf, 48, blocksize);
        put32(&mut buf, 52, 4);
        put32(&mut buf, 60, 8);
        buf
    }

    #[test]
    fn magic_in_either_order() {
        assert_eq!(magic_endian(&MAGIC.to_le_bytes()), Some(Endian::Little));
        assert_eq!(magic_endian(&MAGIC.to_be_bytes()), Some(Endian::Big));
        assert_eq!(magic_endian(&[0, 0, 0, 0]), None);
        assert_eq!(magic_endian(&[0x22]), None);
    }

    #[test]
    fn superblock_rejects_bad_blocksize() {
        for bs in [0, 100, 1000, 1 << 20] {
            let raw = superblock(Endian::Little, bs);
            assert!(matches!(Superblock::parse(&raw), Err(QnxError::Corrupt(_))), "bs {bs}");
        }
        let sb = Superblock::parse(&superblock(Endian::Big, 1024)).unwrap();
        assert_eq!(sb.endian, Endian::Big);
        assert_eq!(sb.blocksize, 1024);
        assert_eq!(sb.num_blocks, 8);
    }

    #[test]
    fn open_without_superblock_is_unsupported() {
        let stream = SharedStream::new(Box::new(Cursor::new(vec![0u8; 0x4000])));
        assert!(matches!(Qnx6Volume::open(stream), Err(QnxError::Unsupported(_))));
    }

    #[test]
    fn open_with_truncated_backup_keeps_primary() {
        let mut image = vec![0u8; 0x1000];
        image[..SUPERBLOCK_SIZE].copy_from_slice(&superblock(Endian::Little, 512));
        let volume = Qnx6Volume::open(SharedStream::new(Box::new(Cursor::new(image)))).unwrap();
        assert_eq!(volume.data_start, 0x1000);
        assert_eq!(volume.ptr_bits, 7);
    }

    fn volume(num_blocks: u32, data_blocks: usize) -> Qnx6Volume {
        let mut image = vec![0u8; 0x1000 + data_blocks * 512];
        image[..SUPERBLOCK_SIZE].copy_from_slice(&superblock(Endian::Little, 512));
        image[60..64].copy_from_slice(&num_blocks.to_le_bytes());
        Qnx6Volume::open(SharedStream::new(Box::new(Cursor::new(image)))).unwrap()
    }

    #[test]
    fn sparse_deep_tree_is_one_run() {
        let volume = volume(1 << 21, 0);
        let tree = BlockTree {
            size: 1 << 30,
            ptrs: [SPARSE; POINTERS],
            levels: 3,
        };
        let runs = volume.tree_runs(&tree).unwrap();
        assert_eq!(runs, vec![Run { offset: None, len: 1 << 30 }]);
    }

    #[test]
    fn self_referencing_tree_exhausts_the_image() {
        // Block 0 is an all-zero pointer table, so every slot points back at it.
        let volume = volume(1 << 21, 1);
        let tree = BlockTree {
            size: 1 << 20,
            ptrs: [0; POINTERS],
            levels: 1,
        };
        assert!(matches!(volume.tree_runs(&tree), Err(QnxError::Corrupt(_))));
    }

    #[test]
    fn tree_shorter_than_size_is_corrupt() {
        let volume = volume(64, 0);
        let tree = BlockTree {
            size: 17 * 512,
            ptrs: [SPARSE; POINTERS],
            levels: 0,
        };
        assert!(matches!(volume.tree_runs(&tree), Err(QnxError::Corrupt(_))));
    }

    #[test]
    fn inode_out_of_range_is_corrupt() {
        let mut image = vec![0u8; 0x1000];
        image[..SUPERBLOCK_SIZE].copy_from_slice(&superblock(Endian::Little, 512));
        let volume = Qnx6Volume::open(SharedStream::new(Box::new(Cursor::new(image)))).unwrap();
        assert!(matches!(volume.read_inode(0), Err(QnxError::Corrupt(_))));
        assert!(matches!(volume.read_inode(5), Err(QnxError::Corrupt(_))));
    }
}
