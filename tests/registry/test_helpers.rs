//! Shared fixtures for registry BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use minfs_volume::test_support::RecordingBackend;
use minfs_volume::{RegistryError, VolumeOptions, VolumeRegistry};
use rstest::fixture;
use tempfile::TempDir;

#[derive(Clone, Debug)]
pub struct RegistryContext {
    pub backend: RecordingBackend,
    pub registry: Arc<VolumeRegistry<RecordingBackend>>,
    pub mount_root: Utf8PathBuf,
    pub volume: Option<String>,
    pub last_error: Option<RegistryError>,
    _tmp: Arc<TempDir>,
}

impl RegistryContext {
    pub fn volume_name(&self) -> &str {
        self.volume
            .as_deref()
            .unwrap_or_else(|| panic!("test setup requires a created volume"))
    }

    /// Records the outcome of a registry call, keeping the first failure.
    pub fn record<T>(&mut self, result: Result<T, RegistryError>) {
        if let Err(err) = result {
            self.last_error.get_or_insert(err);
        }
    }
}

#[fixture]
pub fn registry_context() -> RegistryContext {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("create registry temp dir: {err}"));
    let mount_root = Utf8PathBuf::from_path_buf(tmp.path().join("volumes"))
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    let backend = RecordingBackend::new();
    let registry = VolumeRegistry::open(mount_root.clone(), backend.clone())
        .unwrap_or_else(|err| panic!("registry should open: {err}"));

    RegistryContext {
        backend,
        registry: Arc::new(registry),
        mount_root,
        volume: None,
        last_error: None,
        _tmp: Arc::new(tmp),
    }
}

pub fn bucket_options(bucket: &str) -> VolumeOptions {
    VolumeOptions::new()
        .endpoint("http://minio.local:9000")
        .bucket(bucket)
        .access_key("minio")
        .secret_key("minio123")
}
