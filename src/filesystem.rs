//! A mounted image: one backend driver bound to one stream.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::entry::Entry;
use crate::path::{join, normalize_separators};
use crate::stream::ReadSeek;
use crate::traits::{Driver, NodeRef};
use crate::{FsError, FsOptions, Stat};

/// Source of synthesized device ids. Images carry no OS device number, so
/// every mounted filesystem gets its own.
static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    backend: &'static str,
    driver: Box<dyn Driver>,
    device_id: u64,
    options: FsOptions,
}

/// Handle to one mounted image.
///
/// Cloning is cheap and every clone refers to the same mount. There is no
/// current directory: relative paths passed to [`get`](Self::get) are walked
/// from the root.
///
/// # Example
///
/// ```rust,no_run
/// use std::fs::File;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let image = File::open("qnx6.img")?;
/// let fs = imagefs::open(Box::new(image))?;
/// for name in fs.get("/etc")?.iterdir()? {
///     println!("{}", name?);
/// }
/// let passwd = fs.get("/etc/passwd")?.read_to_string()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Filesystem {
    inner: Arc<Inner>,
}

impl Filesystem {
    /// Wrap a driver produced by backend `backend` with default options.
    pub fn new(backend: &'static str, driver: Box<dyn Driver>) -> Self {
        Self::with_options(backend, driver, FsOptions::default())
    }

    /// Wrap a driver with explicit options.
    pub fn with_options(backend: &'static str, driver: Box<dyn Driver>, options: FsOptions) -> Self {
        let device_id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(backend, device_id, "mounted filesystem");
        Self {
            inner: Arc::new(Inner {
                backend,
                driver,
                device_id,
                options,
            }),
        }
    }

    /// Name of the backend that mounted this image.
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend
    }

    /// Synthesized device id reported in every [`Stat`] from this mount.
    pub fn device_id(&self) -> u64 {
        self.inner.device_id
    }

    /// Options in effect.
    pub fn options(&self) -> &FsOptions {
        &self.inner.options
    }

    /// Resolve `path` to an [`Entry`]. A final symlink is not followed.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if a component does not exist
    /// - [`FsError::NotADirectory`] if an intermediate component is not a directory
    /// - [`FsError::Generic`] on corruption, I/O failure or symlink loops
    pub fn get(&self, path: &str) -> Result<Entry, FsError> {
        let node = self.get_node(path, None)?;
        Ok(Entry::new(self.clone(), path.to_string(), node))
    }

    /// Resolve `path` relative to the already-resolved directory node `start`,
    /// whose path is `base`.
    ///
    /// Absolute paths still start at the root. The entry's path is
    /// `join(base, path)`, so relative symlinks below it resolve against the
    /// right directory.
    pub fn get_from(&self, base: &str, path: &str, start: &NodeRef) -> Result<Entry, FsError> {
        let node = self.get_node(path, Some(start))?;
        Ok(Entry::new(self.clone(), join_in(self, base, path), node))
    }

    /// Resolve `path` to a raw node, optionally relative to `start`.
    ///
    /// Passing the node of an already-resolved directory avoids walking from
    /// the root again.
    pub fn get_node(&self, path: &str, start: Option<&NodeRef>) -> Result<NodeRef, FsError> {
        let options = &self.inner.options;
        let path = normalize_separators(path, options.alt_separator);
        self.inner
            .driver
            .get(&path, start, options.max_symlink_depth)
    }

    /// The root directory.
    pub fn root(&self) -> Result<Entry, FsError> {
        let node = self.inner.driver.root()?;
        Ok(Entry::new(self.clone(), "/".to_string(), node))
    }

    /// Returns `true` if `path` resolves (a dangling final symlink counts).
    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Open the file at `path`, following symlinks.
    pub fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>, FsError> {
        self.get(path)?.open()
    }

    /// Names in the directory at `path`, without `.` and `..`.
    pub fn listdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        self.get(path)?.iterdir()?.collect()
    }

    /// Entries in the directory at `path`, without `.` and `..`.
    pub fn scandir(&self, path: &str) -> Result<Vec<Entry>, FsError> {
        self.get(path)?.scandir()?.collect()
    }

    /// Metadata of `path`, following symlinks.
    pub fn stat(&self, path: &str) -> Result<Stat, FsError> {
        self.get(path)?.stat(true)
    }

    /// Metadata of `path` itself.
    pub fn lstat(&self, path: &str) -> Result<Stat, FsError> {
        self.get(path)?.lstat()
    }

    /// Raw target of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<String, FsError> {
        self.get(path)?.readlink()
    }

    /// Returns `true` if `path` resolves to a directory. Never fails.
    pub fn is_dir(&self, path: &str) -> bool {
        self.get(path).is_ok_and(|e| e.is_dir(true))
    }

    /// Returns `true` if `path` resolves to a regular file. Never fails.
    pub fn is_file(&self, path: &str) -> bool {
        self.get(path).is_ok_and(|e| e.is_file(true))
    }

    /// Returns `true` if `path` itself is a symlink. Never fails.
    pub fn is_symlink(&self, path: &str) -> bool {
        self.get(path).is_ok_and(|e| e.is_symlink())
    }

    /// Top-down traversal starting at `path`.
    ///
    /// Symlinked directories are reported in `dirnames` but never descended
    /// into. A directory that fails to list yields one `Err` and the walk
    /// continues with its siblings. Each directory inode is visited at most
    /// once, so corrupt images with directory cycles still terminate.
    pub fn walk(&self, path: &str) -> Walk {
        Walk {
            fs: self.clone(),
            stack: vec![path.to_string()],
            seen: HashSet::new(),
        }
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("backend", &self.inner.backend)
            .field("device_id", &self.inner.device_id)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// One directory visited by [`Filesystem::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkStep {
    /// Path of the directory.
    pub dirpath: String,
    /// Names of child directories, including symlinks to directories.
    pub dirnames: Vec<String>,
    /// Names of all other children.
    pub filenames: Vec<String>,
}

/// Iterator returned by [`Filesystem::walk`].
#[derive(Debug)]
pub struct Walk {
    fs: Filesystem,
    stack: Vec<String>,
    seen: HashSet<u64>,
}

impl Walk {
    fn visit(&mut self, dirpath: String) -> Result<WalkStep, FsError> {
        let mut step = WalkStep {
            dirpath,
            dirnames: Vec::new(),
            filenames: Vec::new(),
        };
        let mut descend = Vec::new();

        let dir = self.fs.get(&step.dirpath)?;
        self.seen.insert(dir.stat(true)?.ino);
        for child in dir.scandir()? {
            let child = child?;
            if child.is_dir(true) {
                if !child.is_symlink() {
                    match child.lstat() {
                        Ok(stat) if self.seen.insert(stat.ino) => {
                            descend.push(child.path().to_string());
                        }
                        Ok(stat) => {
                            warn!(
                                path = child.path(),
                                ino = stat.ino,
                                "directory already visited, not descending"
                            );
                        }
                        Err(error) => {
                            warn!(path = child.path(), %error, "unreadable directory, not descending");
                        }
                    }
                }
                step.dirnames.push(child.name().to_string());
            } else {
                step.filenames.push(child.name().to_string());
            }
        }

        // Reverse so the first child is visited first.
        self.stack.extend(descend.into_iter().rev());
        Ok(step)
    }
}

impl Iterator for Walk {
    type Item = Result<WalkStep, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        let dirpath = self.stack.pop()?;
        Some(self.visit(dirpath))
    }
}

/// Join helper that applies this filesystem's alternate separator.
pub(crate) fn join_in(fs: &Filesystem, base: &str, name: &str) -> String {
    join(base, name, fs.options().alt_separator)
}
