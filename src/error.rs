//! Error kinds surfaced by the volume registry.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Coarse classification of a [`RegistryError`], used by transports to pick a
/// response without matching on every field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Malformed or missing input.
    InvalidArgument,
    /// A volume with the requested name is already registered.
    AlreadyExists,
    /// No volume with the requested name is registered.
    NotFound,
    /// Removal was attempted while the volume still has mount holders.
    InUse,
    /// A local filesystem operation failed.
    Io,
    /// The mount backend rejected a mount.
    Mount,
    /// The mount backend rejected an unmount.
    Unmount,
}

impl ErrorKind {
    /// Returns the stable kebab-case label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid-argument",
            Self::AlreadyExists => "already-exists",
            Self::NotFound => "not-found",
            Self::InUse => "in-use",
            Self::Io => "io-error",
            Self::Mount => "mount-error",
            Self::Unmount => "unmount-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::VolumeRegistry`] operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    /// Raised when a name or option is empty, missing, or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Raised when creating a name that is already registered.
    #[error("volume {name} already exists")]
    AlreadyExists {
        /// Name of the conflicting volume.
        name: String,
    },
    /// Raised when an operation targets an unregistered name.
    #[error("volume {name} not found")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },
    /// Raised when removing a volume that still has mount holders.
    #[error("volume {name} is currently used by {ref_count} container(s)")]
    InUse {
        /// Name of the referenced volume.
        name: String,
        /// Number of holders at the time of the request.
        ref_count: usize,
    },
    /// Raised when the mount directory cannot be prepared or removed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the backend fails to mount a volume.
    #[error("failed to mount volume {name}: {message}")]
    Mount {
        /// Volume being mounted.
        name: String,
        /// Error text reported by the backend.
        message: String,
    },
    /// Raised when the backend fails to unmount a volume.
    #[error("failed to unmount volume {name}: {message}")]
    Unmount {
        /// Volume being unmounted.
        name: String,
        /// Error text reported by the backend.
        message: String,
    },
}

impl RegistryError {
    /// Returns the [`ErrorKind`] of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InUse { .. } => ErrorKind::InUse,
            Self::Io { .. } => ErrorKind::Io,
            Self::Mount { .. } => ErrorKind::Mount,
            Self::Unmount { .. } => ErrorKind::Unmount,
        }
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_owned(),
        }
    }

    pub(crate) fn io(path: &camino::Utf8Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
