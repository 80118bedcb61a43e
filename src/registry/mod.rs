//! Reference-counted volume registry.
//!
//! The registry maps volume names to their spec, mount path and holder count.
//! A volume is mounted by the backend when its first holder arrives and
//! unmounted when its last holder leaves; every other mount or unmount only
//! adjusts the count.
//!
//! # Locking
//!
//! The name map sits behind an async [`RwLock`] and is only held long
//! enough to look up, insert or delete an entry. Each volume's state has its
//! own [`Mutex`], held across the backend call, which makes the `0 → 1` and
//! `1 → 0` transitions atomic per volume. No task waits on a volume lock or
//! on the backend while holding the map lock, so a slow mount never stalls
//! lookups, `create`, or transitions of other volumes.
//!
//! `remove` unlinks a volume while holding both the map write lock and the
//! volume lock, and marks the volume removed. A `mount` that looked the
//! volume up just before then sees the mark and reports it as not found.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tokio::sync::{Mutex, RwLock};

use crate::backend::MountBackend;
use crate::error::RegistryError;
use crate::volume::{Capabilities, VolumeInfo, VolumeOptions, VolumeSpec};

/// How `create` treats a name that is already registered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DuplicatePolicy {
    /// Always fail with [`RegistryError::AlreadyExists`].
    #[default]
    Reject,
    /// Succeed without changes when the stored spec is identical, otherwise
    /// fail with [`RegistryError::AlreadyExists`].
    VerifyIdentical,
}

#[derive(Debug, Default)]
struct SlotState {
    ref_count: usize,
    removed: bool,
}

#[derive(Debug)]
struct VolumeSlot {
    spec: VolumeSpec,
    mount_path: Utf8PathBuf,
    state: Mutex<SlotState>,
}

impl VolumeSlot {
    fn info(&self) -> VolumeInfo {
        VolumeInfo {
            name: self.spec.name.clone(),
            mount_path: self.mount_path.clone(),
        }
    }
}

/// Owns every registered volume and arbitrates mount requests against them.
#[derive(Debug)]
pub struct VolumeRegistry<B: MountBackend> {
    mount_root: Utf8PathBuf,
    root_dir: Dir,
    backend: B,
    duplicate_policy: DuplicatePolicy,
    volumes: RwLock<BTreeMap<String, Arc<VolumeSlot>>>,
}

impl<B: MountBackend> VolumeRegistry<B> {
    /// Opens a registry rooted at `mount_root`, creating the directory when
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] when the mount root cannot be created or
    /// opened.
    pub fn open(mount_root: impl Into<Utf8PathBuf>, backend: B) -> Result<Self, RegistryError> {
        let mount_root = mount_root.into();
        Dir::create_ambient_dir_all(&mount_root, ambient_authority())
            .map_err(|err| RegistryError::io(&mount_root, &err))?;
        let root_dir = Dir::open_ambient_dir(&mount_root, ambient_authority())
            .map_err(|err| RegistryError::io(&mount_root, &err))?;
        tracing::debug!(%mount_root, "opened volume registry");

        Ok(Self {
            mount_root,
            root_dir,
            backend,
            duplicate_policy: DuplicatePolicy::default(),
            volumes: RwLock::new(BTreeMap::new()),
        })
    }

    /// Replaces the duplicate-create policy.
    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Returns the directory volumes are mounted under.
    #[must_use]
    pub fn mount_root(&self) -> &Utf8Path {
        &self.mount_root
    }

    /// Returns the injected mount backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Registers a new volume. Nothing is mounted or created on disk until
    /// the first [`mount`](Self::mount).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] when the name is unusable,
    /// `options` is `None`, or any option is empty, and
    /// [`RegistryError::AlreadyExists`] when the name is taken (subject to
    /// the [`DuplicatePolicy`]).
    pub async fn create(
        &self,
        name: &str,
        options: Option<VolumeOptions>,
    ) -> Result<(), RegistryError> {
        tracing::debug!(method = "create", volume = name, ?options);
        let options = options.ok_or_else(|| {
            RegistryError::InvalidArgument(String::from("no options provided"))
        })?;
        let spec = options.into_spec(name)?;

        let mut volumes = self.volumes.write().await;
        if let Some(existing) = volumes.get(name) {
            if self.duplicate_policy == DuplicatePolicy::VerifyIdentical
                && existing.spec == spec
            {
                tracing::debug!(volume = name, "volume already registered with identical spec");
                return Ok(());
            }
            return Err(RegistryError::AlreadyExists {
                name: name.to_owned(),
            });
        }

        let mount_path = self.mount_root.join(name);
        tracing::info!(volume = name, %mount_path, "volume created");
        volumes.insert(
            name.to_owned(),
            Arc::new(VolumeSlot {
                spec,
                mount_path,
                state: Mutex::new(SlotState::default()),
            }),
        );
        Ok(())
    }

    /// Unregisters an unreferenced volume and deletes whatever occupies its
    /// mount path, directory tree or stray file alike.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`], [`RegistryError::InUse`] when the
    /// volume still has holders, or [`RegistryError::Io`] when the mount path
    /// cannot be deleted (the volume then stays registered).
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        tracing::debug!(method = "remove", volume = name);
        loop {
            let mut volumes = self.volumes.write().await;
            let slot = volumes
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::not_found(name))?;

            // A busy volume is mid-transition: wait for it without the map lock.
            let Ok(mut state) = slot.state.try_lock() else {
                drop(volumes);
                drop(slot.state.lock().await);
                continue;
            };

            if state.ref_count > 0 {
                return Err(RegistryError::InUse {
                    name: name.to_owned(),
                    ref_count: state.ref_count,
                });
            }

            self.remove_mount_dir(name, &slot.mount_path)?;
            state.removed = true;
            volumes.remove(name);
            tracing::info!(volume = name, "volume removed");
            return Ok(());
        }
    }

    /// Returns the mount path of a volume without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unregistered names.
    pub async fn path(&self, name: &str) -> Result<Utf8PathBuf, RegistryError> {
        tracing::debug!(method = "path", volume = name);
        let volumes = self.volumes.read().await;
        volumes
            .get(name)
            .map(|slot| slot.mount_path.clone())
            .ok_or_else(|| RegistryError::not_found(name))
    }

    /// Adds a holder to a volume and returns its mount path. The first holder
    /// prepares the directory and triggers the backend mount.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`], [`RegistryError::Io`] when the
    /// mount path cannot be used as a directory, or [`RegistryError::Mount`]
    /// with the backend's message. On error the holder count is unchanged.
    pub async fn mount(&self, name: &str) -> Result<Utf8PathBuf, RegistryError> {
        tracing::debug!(method = "mount", volume = name);
        let slot = self.slot(name).await?;
        let mut state = slot.state.lock().await;
        if state.removed {
            return Err(RegistryError::not_found(name));
        }

        if state.ref_count > 0 {
            state.ref_count += 1;
            tracing::debug!(volume = name, holders = state.ref_count, "reusing active mount");
            return Ok(slot.mount_path.clone());
        }

        self.ensure_mount_dir(name, &slot.mount_path)?;
        if let Err(err) = self.backend.mount(&slot.spec, &slot.mount_path).await {
            tracing::warn!(volume = name, error = %err, "backend mount failed");
            return Err(RegistryError::Mount {
                name: name.to_owned(),
                message: err.to_string(),
            });
        }

        state.ref_count = 1;
        tracing::info!(volume = name, mount_path = %slot.mount_path, "volume mounted");
        Ok(slot.mount_path.clone())
    }

    /// Drops a holder from a volume. The last holder triggers the backend
    /// unmount.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Unmount`] with
    /// the backend's message, in which case the holder count is unchanged so
    /// the call can be retried.
    pub async fn unmount(&self, name: &str) -> Result<(), RegistryError> {
        tracing::debug!(method = "unmount", volume = name);
        let slot = self.slot(name).await?;
        let mut state = slot.state.lock().await;
        if state.removed {
            return Err(RegistryError::not_found(name));
        }

        if state.ref_count > 1 {
            state.ref_count -= 1;
            tracing::debug!(volume = name, holders = state.ref_count, "mount still in use");
            return Ok(());
        }

        if let Err(err) = self.backend.unmount(&slot.mount_path).await {
            tracing::warn!(volume = name, error = %err, "backend unmount failed");
            return Err(RegistryError::Unmount {
                name: name.to_owned(),
                message: err.to_string(),
            });
        }

        state.ref_count = 0;
        tracing::info!(volume = name, "volume unmounted");
        Ok(())
    }

    /// Returns the name and mount path of a volume.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unregistered names.
    pub async fn get(&self, name: &str) -> Result<VolumeInfo, RegistryError> {
        tracing::debug!(method = "get", volume = name);
        let volumes = self.volumes.read().await;
        volumes
            .get(name)
            .map(|slot| slot.info())
            .ok_or_else(|| RegistryError::not_found(name))
    }

    /// Lists every registered volume, ordered by name.
    pub async fn list(&self) -> Vec<VolumeInfo> {
        tracing::debug!(method = "list");
        let volumes = self.volumes.read().await;
        volumes.values().map(|slot| slot.info()).collect()
    }

    /// Returns the current number of holders of a volume.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unregistered names.
    pub async fn ref_count(&self, name: &str) -> Result<usize, RegistryError> {
        let slot = self.slot(name).await?;
        let state = slot.state.lock().await;
        if state.removed {
            return Err(RegistryError::not_found(name));
        }
        Ok(state.ref_count)
    }

    /// Declares the registry's coordination scope.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities::local()
    }

    async fn slot(&self, name: &str) -> Result<Arc<VolumeSlot>, RegistryError> {
        let volumes = self.volumes.read().await;
        volumes
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(name))
    }

    fn ensure_mount_dir(&self, name: &str, mount_path: &Utf8Path) -> Result<(), RegistryError> {
        match self.root_dir.symlink_metadata(name) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(RegistryError::Io {
                path: mount_path.to_path_buf(),
                message: String::from("already exists and is not a directory"),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(%mount_path, "creating mount directory");
                self.root_dir
                    .create_dir_all(name)
                    .map_err(|create_err| RegistryError::io(mount_path, &create_err))
            }
            Err(err) => Err(RegistryError::io(mount_path, &err)),
        }
    }

    fn remove_mount_dir(&self, name: &str, mount_path: &Utf8Path) -> Result<(), RegistryError> {
        let removal = match self.root_dir.symlink_metadata(name) {
            Ok(metadata) if metadata.is_dir() => self.root_dir.remove_dir_all(name),
            Ok(_) => self.root_dir.remove_file(name),
            Err(err) => Err(err),
        };
        match removal {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RegistryError::io(mount_path, &err)),
        }
    }
}
