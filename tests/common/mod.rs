//! Synthetic QNX4 and QNX6 images for integration tests.
//!
//! Both builders take the same declarative [`Node`] tree and lay it out the
//! way the real formats do, small enough to keep in memory.

#![allow(dead_code)]

use std::io::Cursor;

use imagefs::Filesystem;

pub const UID: u32 = 1000;
pub const GID: u32 = 100;
pub const MTIME: u32 = 1_600_000_000;
pub const ATIME: u32 = 1_600_000_100;
pub const CTIME: u32 = 1_600_000_200;

const S_IFDIR: u16 = 0o040000;
const S_IFREG: u16 = 0o100000;
const S_IFLNK: u16 = 0o120000;

/// A file tree to lay out in an image.
#[derive(Debug, Clone)]
pub enum Node {
    Dir(Vec<(String, Node)>),
    File(Vec<u8>),
    /// Regular file stored as one extent per block (QNX4) to force `xblk` chains.
    Fragmented(Vec<u8>),
    /// Regular file of this many bytes with no allocated blocks (QNX6).
    Sparse(u64),
    Symlink(String),
}

pub fn dir(children: Vec<(&str, Node)>) -> Node {
    Node::Dir(children.into_iter().map(|(n, c)| (n.to_string(), c)).collect())
}

pub fn file(data: &[u8]) -> Node {
    Node::File(data.to_vec())
}

pub fn symlink(target: &str) -> Node {
    Node::Symlink(target.to_string())
}

/// A tree exercising the common cases.
pub fn sample_tree() -> Node {
    dir(vec![
        (
            "etc",
            dir(vec![
                ("passwd", file(b"root:x:0:0:root:/root:/bin/sh\n")),
                ("hosts", file(b"127.0.0.1 localhost\n")),
                ("motd", symlink("../usr/share/motd")),
            ]),
        ),
        (
            "usr",
            dir(vec![(
                "share",
                dir(vec![("motd", file(b"welcome\n")), ("empty", dir(vec![]))]),
            )]),
        ),
        ("bin", symlink("/usr/share")),
        ("dangling", symlink("/nowhere")),
        ("loop_a", symlink("loop_b")),
        ("loop_b", symlink("loop_a")),
        ("self", symlink("self")),
        ("big", file(&pattern(20_000))),
        ("a_rather_long_file_name_beyond_limits.txt", file(b"long name\n")),
    ])
}

/// Deterministic non-repeating-per-block content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Route library diagnostics to the test harness; `RUST_LOG=imagefs=trace`
/// shows symlink hops and detection.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn mount(image: Vec<u8>) -> Filesystem {
    init_tracing();
    imagefs::open(Box::new(Cursor::new(image))).expect("image mounts")
}

fn put16(buf: &mut [u8], off: usize, v: u16, big: bool) {
    let b = if big { v.to_be_bytes() } else { v.to_le_bytes() };
    buf[off..off + 2].copy_from_slice(&b);
}

fn put32(buf: &mut [u8], off: usize, v: u32, big: bool) {
    let b = if big { v.to_be_bytes() } else { v.to_le_bytes() };
    buf[off..off + 4].copy_from_slice(&b);
}

fn put64(buf: &mut [u8], off: usize, v: u64, big: bool) {
    let b = if big { v.to_be_bytes() } else { v.to_le_bytes() };
    buf[off..off + 8].copy_from_slice(&b);
}

// =============================================================================
// QNX4
// =============================================================================

const Q4_BLOCK: usize = 512;
const Q4_USED: u8 = 0x01;
const Q4_LINK: u8 = 0x08;
/// Extents per xblk; the format allows 60, fewer forces chains in small tests.
const Q4_XBLK_CAPACITY: usize = 3;

/// Builds little-endian QNX4 images.
pub struct Qnx4Builder {
    image: Vec<u8>,
    next_block: u32,
}

impl Qnx4Builder {
    pub fn build(root: &Node) -> Vec<u8> {
        let mut b = Qnx4Builder {
            image: vec![0u8; Q4_BLOCK],
            next_block: 2,
        };
        let Node::Dir(children) = root else {
            panic!("root must be a directory");
        };
        b.dir(children, None);
        b.image
    }

    fn alloc(&mut self, blocks: u32) -> u32 {
        let start = self.next_block;
        self.next_block += blocks;
        let end = (self.next_block as usize - 1) * Q4_BLOCK;
        if self.image.len() < end {
            self.image.resize(end, 0);
        }
        start
    }

    fn offset(blk: u32) -> usize {
        (blk as usize - 1) * Q4_BLOCK
    }

    fn slot_offset(first: u32, slot: usize) -> usize {
        Self::offset(first) + slot * 64
    }

    /// Lay out a directory, returning its first block.
    fn dir(&mut self, children: &[(String, Node)], parent: Option<u32>) -> u32 {
        let entries = children.len() + 2;
        let blocks = entries.div_ceil(8) as u32;
        let first = self.alloc(blocks);
        let dot = if parent.is_none() { "/" } else { "." };

        let size = (entries * 64) as u32;
        self.inode(
            Self::slot_offset(first, 0),
            dot,
            S_IFDIR | 0o755,
            size,
            &[(first, blocks)],
            2,
        );
        self.link(Self::slot_offset(first, 1), "..", parent.unwrap_or(first), 0);

        for (i, (name, node)) in children.iter().enumerate() {
            let at = Self::slot_offset(first, i + 2);
            match node {
                Node::Dir(kids) => {
                    let child = self.dir(kids, Some(first));
                    self.link(at, name, child, 0);
                }
                other => {
                    let (mode, data, fragmented) = match other {
                        Node::File(d) => (S_IFREG | 0o644, d.clone(), false),
                        Node::Fragmented(d) => (S_IFREG | 0o644, d.clone(), true),
                        Node::Sparse(len) => (S_IFREG | 0o644, vec![0u8; *len as usize], false),
                        Node::Symlink(t) => (S_IFLNK | 0o777, t.as_bytes().to_vec(), false),
                        Node::Dir(_) => unreachable!(),
                    };
                    let extents = self.data(&data, fragmented);
                    if name.len() <= 16 {
                        self.inode(at, name, mode, data.len() as u32, &extents, 1);
                    } else {
                        let home = self.alloc(1);
                        self.inode(Self::offset(home), name, mode, data.len() as u32, &extents, 1);
                        self.link(at, name, home, 0);
                    }
                }
            }
        }
        first
    }

    fn data(&mut self, data: &[u8], fragmented: bool) -> Vec<(u32, u32)> {
        let blocks = data.len().div_ceil(Q4_BLOCK) as u32;
        if blocks == 0 {
            return Vec::new();
        }
        let extents: Vec<(u32, u32)> = if fragmented {
            (0..blocks)
                .map(|_| {
                    let blk = self.alloc(1);
                    self.alloc(1); // gap keeps extents from being adjacent
                    (blk, 1)
                })
                .collect()
        } else {
            vec![(self.alloc(blocks), blocks)]
        };
        let mut chunks = data.chunks(Q4_BLOCK);
        for &(start, len) in &extents {
            for i in 0..len {
                if let Some(chunk) = chunks.next() {
                    let off = Self::offset(start + i);
                    self.image[off..off + chunk.len()].copy_from_slice(chunk);
                }
            }
        }
        extents
    }

    fn inode(&mut self, at: usize, name: &str, mode: u16, size: u32, extents: &[(u32, u32)], nlink: u16) {
        let mut e = [0u8; 64];
        e[..name.len().min(16)].copy_from_slice(&name.as_bytes()[..name.len().min(16)]);
        put32(&mut e, 16, size, false);
        if let Some(&(start, len)) = extents.first() {
            put32(&mut e, 20, start, false);
            put32(&mut e, 24, len, false);
        }
        if extents.len() > 1 {
            put32(&mut e, 28, self.xblks(&extents[1..]), false);
        }
        put32(&mut e, 32, 0, false);
        put32(&mut e, 36, MTIME, false);
        put32(&mut e, 40, ATIME, false);
        put32(&mut e, 44, CTIME, false);
        put16(&mut e, 48, extents.len() as u16, false);
        put16(&mut e, 50, mode, false);
        put16(&mut e, 52, UID as u16, false);
        put16(&mut e, 54, GID as u16, false);
        put16(&mut e, 56, nlink, false);
        e[63] = Q4_USED;
        self.image[at..at + 64].copy_from_slice(&e);
    }

    /// Write the xblk chain for `rest`, returning the first xblk.
    fn xblks(&mut self, rest: &[(u32, u32)]) -> u32 {
        let groups: Vec<_> = rest.chunks(Q4_XBLK_CAPACITY).collect();
        let blocks: Vec<u32> = groups.iter().map(|_| self.alloc(1)).collect();
        for (i, group) in groups.iter().enumerate() {
            let mut x = [0u8; Q4_BLOCK];
            put32(&mut x, 0, blocks.get(i + 1).copied().unwrap_or(0), false);
            put32(&mut x, 4, if i > 0 { blocks[i - 1] } else { 0 }, false);
            x[8] = group.len() as u8;
            for (j, &(start, len)) in group.iter().enumerate() {
                put32(&mut x, 16 + j * 8, start, false);
                put32(&mut x, 20 + j * 8, len, false);
            }
            x[496..504].copy_from_slice(b"IamXblk\0");
            let off = Self::offset(blocks[i]);
            self.image[off..off + Q4_BLOCK].copy_from_slice(&x);
        }
        blocks[0]
    }

    fn link(&mut self, at: usize, name: &str, blk: u32, index: u8) {
        let mut e = [0u8; 64];
        e[..name.len().min(48)].copy_from_slice(&name.as_bytes()[..name.len().min(48)]);
        put32(&mut e, 48, blk, false);
        e[52] = index;
        e[63] = Q4_LINK;
        self.image[at..at + 64].copy_from_slice(&e);
    }
}

// =============================================================================
// QNX6
// =============================================================================

const Q6_MAGIC: u32 = 0x6819_1122;
const Q6_SPARSE: u32 = 0xFFFF_FFFF;

/// Builds QNX6 images with 512-byte blocks.
pub struct Qnx6Builder {
    pub big_endian: bool,
    pub boot_block: bool,
    /// Write a primary superblock with a lower serial and a broken inode
    /// tree, so only the backup superblock mounts.
    pub stale_primary: bool,
}

struct Q6Inode {
    mode: u16,
    content: Q6Content,
}

enum Q6Content {
    Bytes(Vec<u8>),
    Sparse(u64),
}

impl Default for Qnx6Builder {
    fn default() -> Self {
        Self {
            big_endian: false,
            boot_block: true,
            stale_primary: false,
        }
    }
}

struct Q6Layout {
    big: bool,
    blocks: Vec<[u8; 512]>,
}

impl Q6Layout {
    fn alloc(&mut self) -> u32 {
        self.blocks.push([0u8; 512]);
        (self.blocks.len() - 1) as u32
    }

    /// Store `content` in a block tree, returning `(ptrs, levels)`.
    fn tree(&mut self, content: &Q6Content) -> ([u32; 16], u8) {
        let leaves: Vec<u32> = match content {
            Q6Content::Bytes(data) => data
                .chunks(512)
                .map(|chunk| {
                    let blk = self.alloc();
                    self.blocks[blk as usize][..chunk.len()].copy_from_slice(chunk);
                    blk
                })
                .collect(),
            Q6Content::Sparse(len) => vec![Q6_SPARSE; len.div_ceil(512) as usize],
        };

        let mut ptrs = [Q6_SPARSE; 16];
        if leaves.len() <= 16 {
            ptrs[..leaves.len()].copy_from_slice(&leaves);
            return (ptrs, 0);
        }
        let groups: Vec<_> = leaves.chunks(128).collect();
        assert!(groups.len() <= 16, "file too large for the test builder");
        for (i, group) in groups.iter().enumerate() {
            let blk = self.alloc();
            let mut table = [0xFFu8; 512];
            for (j, &p) in group.iter().enumerate() {
                put32(&mut table, j * 4, p, self.big);
            }
            self.blocks[blk as usize] = table;
            ptrs[i] = blk;
        }
        (ptrs, 1)
    }
}

impl Qnx6Builder {
    pub fn build(&self, root: &Node) -> Vec<u8> {
        let big = self.big_endian;

        // Number inodes depth-first; root is 1.
        let mut inodes: Vec<Q6Inode> = Vec::new();
        let mut long_names: Vec<String> = Vec::new();
        Self::number(root, 1, &mut inodes, &mut long_names, big);

        let mut layout = Q6Layout {
            big,
            blocks: Vec::new(),
        };
        let mut table = Vec::with_capacity(inodes.len() * 128);
        for inode in &inodes {
            let size = match &inode.content {
                Q6Content::Bytes(d) => d.len() as u64,
                Q6Content::Sparse(len) => *len,
            };
            let (ptrs, levels) = layout.tree(&inode.content);
            let mut raw = [0u8; 128];
            put64(&mut raw, 0, size, big);
            put32(&mut raw, 8, UID, big);
            put32(&mut raw, 12, GID, big);
            put32(&mut raw, 20, MTIME, big);
            put32(&mut raw, 24, ATIME, big);
            put32(&mut raw, 28, CTIME, big);
            put16(&mut raw, 32, inode.mode, big);
            for (i, p) in ptrs.iter().enumerate() {
                put32(&mut raw, 36 + i * 4, *p, big);
            }
            raw[100] = levels;
            raw[101] = 1;
            table.extend_from_slice(&raw);
        }

        let mut longfile = Vec::new();
        for name in &long_names {
            let mut blk = [0u8; 512];
            put16(&mut blk, 0, name.len() as u16, big);
            blk[2..2 + name.len()].copy_from_slice(name.as_bytes());
            longfile.extend_from_slice(&blk);
        }

        let inode_tree = layout.tree(&Q6Content::Bytes(table.clone()));
        let longfile_tree = layout.tree(&Q6Content::Bytes(longfile.clone()));
        let num_blocks = layout.blocks.len() as u32;

        let superblock = |serial: u64, inode_tree: ([u32; 16], u8)| {
            let mut sb = [0u8; 512];
            put32(&mut sb, 0, Q6_MAGIC, big);
            put64(&mut sb, 8, serial, big);
            put32(&mut sb, 48, 512, big);
            put32(&mut sb, 52, inodes.len() as u32, big);
            put32(&mut sb, 60, num_blocks, big);
            put64(&mut sb, 72, table.len() as u64, big);
            for (i, p) in inode_tree.0.iter().enumerate() {
                put32(&mut sb, 80 + i * 4, *p, big);
            }
            sb[144] = inode_tree.1;
            put64(&mut sb, 232, longfile.len() as u64, big);
            for (i, p) in longfile_tree.0.iter().enumerate() {
                put32(&mut sb, 240 + i * 4, *p, big);
            }
            sb[304] = longfile_tree.1;
            sb
        };

        let sb_offset = if self.boot_block { 0x2000 } else { 0 };
        let data_start = sb_offset + 0x1000;
        let mut image = vec![0u8; data_start + layout.blocks.len() * 512 + 512];

        let (primary, backup) = if self.stale_primary {
            (superblock(1, ([Q6_SPARSE; 16], 0)), superblock(2, inode_tree))
        } else {
            (superblock(2, inode_tree), superblock(1, inode_tree))
        };
        image[sb_offset..sb_offset + 512].copy_from_slice(&primary);
        for (i, blk) in layout.blocks.iter().enumerate() {
            let off = data_start + i * 512;
            image[off..off + 512].copy_from_slice(blk);
        }
        let backup_at = data_start + layout.blocks.len() * 512;
        image[backup_at..backup_at + 512].copy_from_slice(&backup);
        image
    }

    /// Assign inode `inum` to `node` and its subtree.
    fn number(node: &Node, parent: u32, inodes: &mut Vec<Q6Inode>, long_names: &mut Vec<String>, big: bool) {
        let inum = inodes.len() as u32 + 1;
        let (mode, content) = match node {
            Node::Dir(_) => (S_IFDIR | 0o755, Q6Content::Bytes(Vec::new())),
            Node::File(d) | Node::Fragmented(d) => (S_IFREG | 0o644, Q6Content::Bytes(d.clone())),
            Node::Sparse(len) => (S_IFREG | 0o644, Q6Content::Sparse(*len)),
            Node::Symlink(t) => (S_IFLNK | 0o777, Q6Content::Bytes(t.as_bytes().to_vec())),
        };
        inodes.push(Q6Inode { mode, content });

        let Node::Dir(children) = node else {
            return;
        };
        let mut entries = Vec::new();
        let mut push = |name: &str, target: u32, long_names: &mut Vec<String>| {
            let mut e = [0u8; 32];
            put32(&mut e, 0, target, big);
            e[4] = name.len() as u8;
            if name.len() <= 27 {
                e[5..5 + name.len()].copy_from_slice(name.as_bytes());
            } else {
                put32(&mut e, 8, long_names.len() as u32, big);
                long_names.push(name.to_string());
            }
            entries.extend_from_slice(&e);
        };
        push(".", inum, long_names);
        push("..", parent, long_names);
        for (name, child) in children {
            let child_inum = inodes.len() as u32 + 1;
            push(name, child_inum, long_names);
            Self::number(child, inum, inodes, long_names, big);
        }
        inodes[inum as usize - 1].content = Q6Content::Bytes(entries);
    }
}
