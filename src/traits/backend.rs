//! Backend plugins: format sniffing and mounting.

use std::io::{Read, Seek, SeekFrom};

use crate::stream::{ReadSeek, SharedStream};
use crate::traits::Driver;
use crate::FsError;

/// A pluggable on-disk format.
///
/// # Sniffing contract
///
/// [`sniff`](Self::sniff) must stay cheap and safe against hostile images:
/// seek only to fixed, format-defined offsets, read bounded amounts, and
/// treat every I/O failure or short read as "no match". [`probe`] does the
/// bounded read part.
///
/// # Example
///
/// ```rust
/// use imagefs::stream::{ReadSeek, SharedStream};
/// use imagefs::{probe, Backend, Driver, FsError, Reason};
///
/// struct Ext2;
///
/// impl Backend for Ext2 {
///     fn name(&self) -> &'static str {
///         "ext2"
///     }
///
///     fn sniff(&self, stream: &mut dyn ReadSeek) -> bool {
///         probe(stream, 0x438, 2).is_some_and(|magic| magic == [0x53, 0xef])
///     }
///
///     fn mount(&self, _stream: SharedStream) -> Result<Box<dyn Driver>, FsError> {
///         Err(FsError::generic("", Reason::Unsupported))
///     }
/// }
///
/// let mut image = std::io::Cursor::new(vec![0u8; 4096]);
/// assert!(!Ext2.sniff(&mut image));
/// ```
pub trait Backend: Send + Sync {
    /// Stable backend identifier, such as `"qnxfs"`.
    fn name(&self) -> &'static str;

    /// Cheap format check. Never fails: errors mean "no match".
    fn sniff(&self, stream: &mut dyn ReadSeek) -> bool;

    /// Bind a driver to the image. Detection is a precondition and is not
    /// re-validated beyond what the driver needs to parse its structures.
    fn mount(&self, stream: SharedStream) -> Result<Box<dyn Driver>, FsError>;
}

/// Read exactly `len` bytes at `offset`, or `None` on any failure.
///
/// Intended for [`Backend::sniff`] implementations.
pub fn probe(stream: &mut dyn ReadSeek, offset: u64, len: usize) -> Option<Vec<u8>> {
    stream.seek(SeekFrom::Start(offset)).ok()?;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).ok()?;
    Some(buf)
}
