//! Backend detection.
//!
//! A [`DetectorRegistry`] is an ordered list of [`Backend`]s. Detection asks
//! each one to sniff the stream in registration order and takes the first
//! match, so overlapping signatures resolve deterministically.

use std::fmt;
use std::io::{Seek, SeekFrom};
use std::sync::{Arc, LazyLock};

use tracing::{debug, warn};

use crate::backends::qnx::QnxBackend;
use crate::stream::{ReadSeek, SharedStream};
use crate::traits::Backend;
use crate::{Filesystem, FsError, FsOptions, Reason};

static REGISTRY: LazyLock<DetectorRegistry> = LazyLock::new(|| {
    DetectorRegistry::builder()
        .register(QnxBackend)
        .build()
});

/// The process-wide registry with every built-in backend.
pub fn registry() -> &'static DetectorRegistry {
    &REGISTRY
}

/// Detect the backend for `stream` using the process-wide registry.
pub fn detect(stream: &mut dyn ReadSeek) -> Option<Arc<dyn Backend>> {
    REGISTRY.detect(stream)
}

/// Detect and mount `stream` using the process-wide registry.
///
/// # Errors
///
/// - [`FsError::Generic`] with [`Reason::Unrecognized`] if no backend matches
/// - whatever the matching backend's mount reports
pub fn open(stream: Box<dyn ReadSeek>) -> Result<Filesystem, FsError> {
    REGISTRY.open(stream)
}

/// Ordered, immutable collection of backends.
#[derive(Clone)]
pub struct DetectorRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl DetectorRegistry {
    /// Start an empty registry.
    pub fn builder() -> DetectorRegistryBuilder {
        DetectorRegistryBuilder {
            backends: Vec::new(),
        }
    }

    /// Registered backend names, in probing order.
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Registered backends, in probing order.
    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// The first backend whose sniff accepts `stream`.
    ///
    /// The stream position is restored afterwards when possible.
    pub fn detect(&self, stream: &mut dyn ReadSeek) -> Option<Arc<dyn Backend>> {
        let position = stream.stream_position().ok();

        let found = self.backends.iter().find(|backend| {
            let matched = backend.sniff(stream);
            if let Some(pos) = position {
                if let Err(e) = stream.seek(SeekFrom::Start(pos)) {
                    warn!(backend = backend.name(), error = %e, "failed to restore stream position");
                }
            }
            matched
        });

        match found {
            Some(backend) => {
                debug!(backend = backend.name(), "detected filesystem");
                Some(backend.clone())
            }
            None => {
                debug!(probed = self.backends.len(), "no backend detected");
                None
            }
        }
    }

    /// Detect and mount with default options.
    pub fn open(&self, stream: Box<dyn ReadSeek>) -> Result<Filesystem, FsError> {
        self.open_with(stream, FsOptions::default())
    }

    /// Detect and mount with explicit options.
    ///
    /// # Errors
    ///
    /// - [`FsError::Generic`] with [`Reason::Unrecognized`] if no backend matches
    /// - whatever the matching backend's mount reports
    pub fn open_with(&self, mut stream: Box<dyn ReadSeek>, options: FsOptions) -> Result<Filesystem, FsError> {
        let backend = self
            .detect(stream.as_mut())
            .ok_or_else(|| FsError::generic("", Reason::Unrecognized))?;
        let driver = backend.mount(SharedStream::new(stream))?;
        Ok(Filesystem::with_options(backend.name(), driver, options))
    }
}

impl fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

/// Builder for a [`DetectorRegistry`].
pub struct DetectorRegistryBuilder {
    backends: Vec<Arc<dyn Backend>>,
}

impl DetectorRegistryBuilder {
    /// Append a backend. Earlier registrations are probed first.
    pub fn register<B: Backend + 'static>(mut self, backend: B) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    /// Append an already shared backend.
    pub fn register_arc(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> DetectorRegistry {
        DetectorRegistry {
            backends: self.backends,
        }
    }
}

impl fmt::Debug for DetectorRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorRegistryBuilder")
            .field("len", &self.backends.len())
            .finish()
    }
}
