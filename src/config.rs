//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::command::ProcessCommandRunner;
use crate::error::RegistryError;
use crate::minfs::{CommandMountBackend, DEFAULT_MINFS_BIN, DEFAULT_UMOUNT_BIN};
use crate::registry::{DuplicatePolicy, VolumeRegistry};

/// Default directory volumes are mounted under.
pub const DEFAULT_MOUNT_ROOT: &str = "/tmp";

const CONFIG_FILE_NAME: &str = "minfs-volume.toml";

/// Registry settings merged from defaults, configuration files and
/// `MINFS_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "MINFS",
    discovery(
        app_name = "minfs-volume",
        env_var = "MINFS_CONFIG_PATH",
        config_file_name = "minfs-volume.toml",
        dotfile_name = ".minfs-volume.toml",
        project_file_name = "minfs-volume.toml"
    )
)]
pub struct RegistryConfig {
    /// Directory under which each volume gets its mount point.
    #[ortho_config(default = DEFAULT_MOUNT_ROOT.to_owned())]
    pub mount_root: String,
    /// Program used to mount a bucket.
    #[ortho_config(default = DEFAULT_MINFS_BIN.to_owned())]
    pub minfs_bin: String,
    /// Program used to unmount a mount point.
    #[ortho_config(default = DEFAULT_UMOUNT_BIN.to_owned())]
    pub umount_bin: String,
    /// Treat re-creating a volume with an identical spec as success.
    #[ortho_config(default = false)]
    pub idempotent_create: bool,
    /// Lower the default log level to `debug`.
    #[ortho_config(default = false)]
    pub debug: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl RegistryConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("minfs-volume")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.mount_root,
            &FieldMetadata::new("mount root directory", "MINFS_MOUNT_ROOT", "mount_root"),
        )?;
        Self::require_field(
            &self.minfs_bin,
            &FieldMetadata::new("mount program", "MINFS_MINFS_BIN", "minfs_bin"),
        )?;
        Self::require_field(
            &self.umount_bin,
            &FieldMetadata::new("unmount program", "MINFS_UMOUNT_BIN", "umount_bin"),
        )?;
        Ok(())
    }

    /// Returns the duplicate-create policy selected by `idempotent_create`.
    #[must_use]
    pub const fn duplicate_policy(&self) -> DuplicatePolicy {
        if self.idempotent_create {
            DuplicatePolicy::VerifyIdentical
        } else {
            DuplicatePolicy::Reject
        }
    }

    /// Builds the command-driven mount backend from the configured programs.
    #[must_use]
    pub fn mount_backend(&self) -> CommandMountBackend<ProcessCommandRunner> {
        CommandMountBackend::with_process_runner(self.minfs_bin.trim(), self.umount_bin.trim())
    }

    /// Validates the configuration and opens a registry backed by the
    /// command-driven mount backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for invalid settings or
    /// [`ConfigError::Registry`] when the mount root cannot be prepared.
    pub fn open_registry(
        &self,
    ) -> Result<VolumeRegistry<CommandMountBackend<ProcessCommandRunner>>, ConfigError> {
        self.validate()?;
        let registry = VolumeRegistry::open(self.mount_root.trim(), self.mount_backend())?;
        Ok(registry.with_duplicate_policy(self.duplicate_policy()))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the configured registry cannot be opened.
    #[error("failed to open volume registry: {0}")]
    Registry(#[from] RegistryError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
