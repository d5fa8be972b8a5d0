//! # imagefs
//!
//! Read-only access to filesystems inside disk images, without mounting them
//! through the host operating system.
//!
//! Each on-disk format is a pluggable [`Backend`]. The core detects which
//! backend applies, resolves paths and symlinks, normalizes metadata into
//! [`Stat`], and collapses every backend failure into one [`FsError`]
//! taxonomy. Callers never see backend-specific types.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//!
//! fn dump(path: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let fs = imagefs::open(Box::new(File::open(path)?))?;
//!     println!("mounted with {}", fs.backend_name());
//!
//!     for step in fs.walk("/") {
//!         let step = step?;
//!         for name in &step.filenames {
//!             let entry = fs.get(&step.dirpath)?.get(name)?;
//!             println!("{} {} bytes", entry.path(), entry.lstat()?.size);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`DetectorRegistry`] | Ordered backends, first sniff match wins |
//! | [`Filesystem`] | One image mounted by one backend |
//! | [`Entry`] | One path resolved to one node |
//! | [`Stat`] | Normalized metadata |
//! | [`FsError`] | The five-kind error taxonomy |
//! | [`FsOptions`] | Alternate separator and symlink depth bound |
//!
//! ---
//!
//! ## Data Flow
//!
//! ```text
//! stream ──detect──▶ Backend ──mount──▶ Driver ──get(path)──▶ RawNode ──▶ Entry
//! ```
//!
//! Entry operations may re-enter resolution to follow symlinks before
//! delegating to the node.
//!
//! ---
//!
//! ## Error Handling
//!
//! ```rust
//! use imagefs::{ErrorKind, FsError, Reason};
//!
//! let err = FsError::generic("/a", Reason::SymlinkLoop);
//! assert_eq!(err.kind(), ErrorKind::Generic);
//! assert_eq!(err.to_string(), "too many levels of symbolic links: /a");
//! ```
//!
//! ---
//!
//! ## Thread Safety
//!
//! [`Filesystem`] and [`Entry`] are `Send + Sync`. All image reads go through
//! a [`SharedStream`](stream::SharedStream), which seeks and reads under one
//! lock, so file cursors are independent of each other.
//!
//! ---
//!
//! ## Logging
//!
//! Diagnostics are emitted through `tracing`. The crate never installs a
//! subscriber.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`Stat`], [`NodeKind`], [`FsOptions`], and [`Entry::read_json`] |

mod entry;
mod error;
mod filesystem;
mod registry;
mod stat;
mod traits;
mod types;

pub mod backends;
pub mod path;
pub mod resolve;
pub mod stream;

// Errors
pub use error::{Cause, ErrorKind, FsError, Reason};

// Core types
pub use stat::Stat;
pub use types::{FsOptions, MAX_SYMLINK_DEPTH, NodeKind, RawAttrs};

// Backend plugin traits
pub use traits::{Backend, Driver, NodeRef, RawDirIter, RawNode, probe};

// Filesystem and entries
pub use entry::{Entry, IterDir, ScanDir};
pub use filesystem::{Filesystem, Walk, WalkStep};

// Detection
pub use registry::{DetectorRegistry, DetectorRegistryBuilder, detect, open, registry};
