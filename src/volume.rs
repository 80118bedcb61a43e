//! Volume specifications and the descriptors handed back to callers.

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::error::RegistryError;

/// Option key carrying the remote storage endpoint.
pub const ENDPOINT_OPTION: &str = "endpoint";
/// Option key carrying the bucket name.
pub const BUCKET_OPTION: &str = "bucket";
/// Option key carrying the access key.
pub const ACCESS_KEY_OPTION: &str = "access-key";
/// Option key carrying the secret key.
pub const SECRET_KEY_OPTION: &str = "secret-key";

const REDACTED: &str = "<redacted>";

/// Raw creation options as supplied by a caller. Values are trimmed and
/// validated when converted into a [`VolumeSpec`].
#[derive(Clone, Default, Eq, PartialEq)]
pub struct VolumeOptions {
    endpoint: String,
    bucket: String,
    access_key: String,
    secret_key: String,
}

impl VolumeOptions {
    /// Creates an empty option set; every field must be populated before
    /// conversion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads options from a key/value map using the `endpoint`, `bucket`,
    /// `access-key` and `secret-key` keys. Unknown keys are ignored.
    #[must_use]
    pub fn from_map<S: BuildHasher>(options: &HashMap<String, String, S>) -> Self {
        let value = |key: &str| options.get(key).cloned().unwrap_or_default();
        Self {
            endpoint: value(ENDPOINT_OPTION),
            bucket: value(BUCKET_OPTION),
            access_key: value(ACCESS_KEY_OPTION),
            secret_key: value(SECRET_KEY_OPTION),
        }
    }

    /// Sets the remote endpoint.
    #[must_use]
    pub fn endpoint(mut self, value: impl Into<String>) -> Self {
        self.endpoint = value.into();
        self
    }

    /// Sets the bucket.
    #[must_use]
    pub fn bucket(mut self, value: impl Into<String>) -> Self {
        self.bucket = value.into();
        self
    }

    /// Sets the access key.
    #[must_use]
    pub fn access_key(mut self, value: impl Into<String>) -> Self {
        self.access_key = value.into();
        self
    }

    /// Sets the secret key.
    #[must_use]
    pub fn secret_key(mut self, value: impl Into<String>) -> Self {
        self.secret_key = value.into();
        self
    }

    /// Validates `name` and the options, producing an immutable spec.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] naming the first empty
    /// option, or describing why `name` is unusable.
    pub fn into_spec(self, name: &str) -> Result<VolumeSpec, RegistryError> {
        validate_name(name)?;
        Ok(VolumeSpec {
            name: name.to_owned(),
            endpoint: require_option(&self.endpoint, ENDPOINT_OPTION)?,
            bucket: require_option(&self.bucket, BUCKET_OPTION)?,
            access_key: require_option(&self.access_key, ACCESS_KEY_OPTION)?,
            secret_key: require_option(&self.secret_key, SECRET_KEY_OPTION)?,
        })
    }
}

impl fmt::Debug for VolumeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeOptions")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &REDACTED)
            .finish()
    }
}

fn require_option(value: &str, key: &str) -> Result<String, RegistryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::InvalidArgument(format!(
            "{key} option cannot be empty"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Checks that `name` can be used as a single directory under the mount root.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidArgument`] when the name is empty, is `.`
/// or `..`, or contains a path separator or NUL byte.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::InvalidArgument(String::from(
            "volume name cannot be empty",
        )));
    }
    if matches!(name, "." | "..") || name.contains(['/', '\\', '\0']) {
        return Err(RegistryError::InvalidArgument(format!(
            "volume name {name:?} must be a single path component"
        )));
    }
    Ok(())
}

/// Immutable description of a volume and the bucket backing it.
#[derive(Clone, Eq, PartialEq)]
pub struct VolumeSpec {
    /// Unique volume name.
    pub name: String,
    /// Address of the remote storage server.
    pub endpoint: String,
    /// Remote bucket mounted for this volume.
    pub bucket: String,
    /// Access key for the remote server.
    pub access_key: String,
    /// Secret key for the remote server.
    pub secret_key: String,
}

impl VolumeSpec {
    /// Returns the bucket URL handed to the mount tool, joining the endpoint
    /// and bucket with exactly one slash.
    #[must_use]
    pub fn remote_target(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.bucket)
    }
}

impl fmt::Debug for VolumeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeSpec")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &REDACTED)
            .finish()
    }
}

/// Name and mount path pair returned by `get` and `list`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VolumeInfo {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Local directory the bucket is mounted at.
    #[serde(rename = "Mountpoint")]
    pub mount_path: Utf8PathBuf,
}

/// Coordination scope declared by the registry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Volumes are visible to a single host only.
    Local,
}

/// Static capability descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Capabilities {
    /// Coordination scope of the registry.
    #[serde(rename = "Scope")]
    pub scope: Scope,
}

impl Capabilities {
    /// Capabilities of a single-host registry.
    #[must_use]
    pub const fn local() -> Self {
        Self {
            scope: Scope::Local,
        }
    }
}
