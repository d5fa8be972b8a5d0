//! # Backend Plugin Traits
//!
//! The contract every on-disk format implements.
//!
//! ```text
//! Backend ──sniff/mount──▶ Driver ──root/get──▶ RawNode
//! ```
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Backend`] | Stateless plugin registered in a [`DetectorRegistry`](crate::DetectorRegistry) |
//! | [`Driver`] | One image opened with one backend |
//! | [`RawNode`] | One file, directory or symlink inside the image |
//!
//! ## Error Translation
//!
//! Backends keep their own native error types and translate them at the
//! trait boundary into [`FsError`](crate::FsError), keeping the native error
//! as the cause. Callers never see backend-specific error types.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` and take `&self`.

mod backend;
mod driver;
mod raw_node;

pub use backend::{Backend, probe};
pub use driver::Driver;
pub use raw_node::{NodeRef, RawDirIter, RawNode};
