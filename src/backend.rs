//! Mount backend abstraction.
//!
//! The registry never mounts anything itself. It hands a validated
//! [`VolumeSpec`] and the local mount path to a [`MountBackend`], which may
//! spawn a FUSE helper, issue a native mount syscall, or (in tests) record
//! the call.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;

use crate::volume::VolumeSpec;

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Performs the actual filesystem mount and unmount for a volume.
///
/// Both operations may be slow and may fail. A failure must leave the mount
/// point as it was so the registry can let the caller retry.
pub trait MountBackend: Send + Sync {
    /// Backend specific error type. Only its `Display` text reaches callers.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Mounts the bucket described by `spec` at `mount_path`.
    fn mount<'a>(
        &'a self,
        spec: &'a VolumeSpec,
        mount_path: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Unmounts whatever is mounted at `mount_path`.
    fn unmount<'a>(&'a self, mount_path: &'a Utf8Path) -> BackendFuture<'a, (), Self::Error>;
}
