//! Built-in backends.
//!
//! | Backend | Formats |
//! |---------|---------|
//! | [`qnx::QnxBackend`] | QNX4, QNX6 (either byte order) |

pub mod qnx;
