//! Mount backend that drives the `minfs` FUSE client and `umount`.
//!
//! The mount command receives the bucket URL and the local mount path as
//! arguments. Credentials travel through the child's environment so they
//! never show up in process listings or logs.

use camino::Utf8Path;

use crate::backend::{BackendFuture, MountBackend};
use crate::command::{CommandError, CommandInvocation, CommandRunner, ProcessCommandRunner};
use crate::volume::VolumeSpec;

/// Default `minfs` client binary name.
pub const DEFAULT_MINFS_BIN: &str = "minfs";
/// Default unmount binary name.
pub const DEFAULT_UMOUNT_BIN: &str = "umount";
/// Environment variable carrying the access key to the mount client.
pub const ACCESS_KEY_ENV: &str = "MINFS_ACCESS_KEY";
/// Environment variable carrying the secret key to the mount client.
pub const SECRET_KEY_ENV: &str = "MINFS_SECRET_KEY";

/// [`MountBackend`] implementation that shells out to external binaries.
#[derive(Clone, Debug)]
pub struct CommandMountBackend<R: CommandRunner> {
    minfs_bin: String,
    umount_bin: String,
    runner: R,
}

impl CommandMountBackend<ProcessCommandRunner> {
    /// Creates a backend wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(
        minfs_bin: impl Into<String>,
        umount_bin: impl Into<String>,
    ) -> Self {
        Self::new(minfs_bin, umount_bin, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> CommandMountBackend<R> {
    /// Creates a backend using the provided binaries and runner.
    #[must_use]
    pub fn new(minfs_bin: impl Into<String>, umount_bin: impl Into<String>, runner: R) -> Self {
        Self {
            minfs_bin: minfs_bin.into(),
            umount_bin: umount_bin.into(),
            runner,
        }
    }

    /// Builds the invocation that mounts `spec` at `mount_path`.
    #[must_use]
    pub fn mount_invocation(&self, spec: &VolumeSpec, mount_path: &Utf8Path) -> CommandInvocation {
        CommandInvocation::new(&self.minfs_bin)
            .arg(spec.remote_target())
            .arg(mount_path.as_str())
            .env(ACCESS_KEY_ENV, &spec.access_key)
            .env(SECRET_KEY_ENV, &spec.secret_key)
    }

    /// Builds the invocation that unmounts `mount_path`.
    #[must_use]
    pub fn unmount_invocation(&self, mount_path: &Utf8Path) -> CommandInvocation {
        CommandInvocation::new(&self.umount_bin).arg(mount_path.as_str())
    }

    async fn run_checked(&self, invocation: CommandInvocation) -> Result<(), CommandError> {
        tracing::debug!(command = %invocation.command_string(), "running mount helper");
        let output = self.runner.run(&invocation).await?;
        if output.is_success() {
            return Ok(());
        }
        Err(CommandError::failure(&invocation.program, output))
    }
}

impl<R: CommandRunner> MountBackend for CommandMountBackend<R> {
    type Error = CommandError;

    fn mount<'a>(
        &'a self,
        spec: &'a VolumeSpec,
        mount_path: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.run_checked(self.mount_invocation(spec, mount_path)))
    }

    fn unmount<'a>(&'a self, mount_path: &'a Utf8Path) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.run_checked(self.unmount_invocation(mount_path)))
    }
}
