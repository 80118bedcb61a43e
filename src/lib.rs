//! Core library for the `minfs-volume` lifecycle manager.
//!
//! The crate tracks named volumes backed by remote object-storage buckets and
//! reference-counts the containers using each one, so that the bucket is
//! mounted on the first attach and unmounted after the last detach. The
//! actual mount is delegated to a [`MountBackend`]; the default
//! [`CommandMountBackend`] drives the `minfs` FUSE client.

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod minfs;
pub mod registry;
pub mod test_support;
pub mod volume;

pub use backend::{BackendFuture, MountBackend};
pub use command::{
    CommandError, CommandInvocation, CommandOutput, CommandRunner, ProcessCommandRunner,
};
pub use config::{ConfigError, RegistryConfig};
pub use error::{ErrorKind, RegistryError};
pub use logging::{LoggingError, init_tracing};
pub use minfs::CommandMountBackend;
pub use registry::{DuplicatePolicy, VolumeRegistry};
pub use volume::{Capabilities, Scope, VolumeInfo, VolumeOptions, VolumeSpec};
