//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::backend::{BackendFuture, MountBackend};
use crate::command::{CommandError, CommandFuture, CommandInvocation, CommandOutput, CommandRunner};
use crate::volume::VolumeSpec;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, invocation: &'a CommandInvocation) -> CommandFuture<'a> {
        lock(&self.invocations).push(invocation.clone());
        let response = lock(&self.responses).pop_front();
        Box::pin(async move {
            response.ok_or_else(|| CommandError::Spawn {
                program: invocation.program.clone(),
                message: String::from("no scripted response available"),
            })
        })
    }
}

/// Error produced by [`RecordingBackend`] when a failure has been scripted.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct RecordedBackendError(pub String);

/// A mount call observed by [`RecordingBackend`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountCall {
    /// Name of the mounted volume.
    pub name: String,
    /// Path the volume was mounted at.
    pub mount_path: Utf8PathBuf,
}

#[derive(Debug, Default)]
struct BackendState {
    mounts: Vec<MountCall>,
    unmounts: Vec<Utf8PathBuf>,
    mount_failures: VecDeque<String>,
    unmount_failures: VecDeque<String>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// In-memory [`MountBackend`] that records calls and fails on demand.
///
/// Calls are recorded even when they fail. An optional delay keeps each call
/// in flight long enough for concurrency tests to overlap them.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<BackendState>>,
    delay: Option<Duration>,
}

impl RecordingBackend {
    /// Creates a backend that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose calls each take `delay` to complete.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Arc::default(),
            delay: Some(delay),
        }
    }

    /// Makes the next mount call fail with `message`.
    pub fn fail_next_mount(&self, message: impl Into<String>) {
        lock(&self.state).mount_failures.push_back(message.into());
    }

    /// Makes the next unmount call fail with `message`.
    pub fn fail_next_unmount(&self, message: impl Into<String>) {
        lock(&self.state).unmount_failures.push_back(message.into());
    }

    /// Returns every mount call made so far.
    #[must_use]
    pub fn mounts(&self) -> Vec<MountCall> {
        lock(&self.state).mounts.clone()
    }

    /// Returns every unmount call made so far.
    #[must_use]
    pub fn unmounts(&self) -> Vec<Utf8PathBuf> {
        lock(&self.state).unmounts.clone()
    }

    /// Returns how many mount calls were made.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        lock(&self.state).mounts.len()
    }

    /// Returns how many unmount calls were made.
    #[must_use]
    pub fn unmount_count(&self) -> usize {
        lock(&self.state).unmounts.len()
    }

    /// Returns the largest number of backend calls observed running at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        lock(&self.state).peak_in_flight
    }

    fn begin(&self) {
        let mut state = lock(&self.state);
        state.in_flight += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
    }

    fn finish(&self) {
        let mut state = lock(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl MountBackend for RecordingBackend {
    type Error = RecordedBackendError;

    fn mount<'a>(
        &'a self,
        spec: &'a VolumeSpec,
        mount_path: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.begin();
            self.pause().await;
            let failure = {
                let mut state = lock(&self.state);
                state.mounts.push(MountCall {
                    name: spec.name.clone(),
                    mount_path: mount_path.to_path_buf(),
                });
                state.mount_failures.pop_front()
            };
            self.finish();
            failure.map_or(Ok(()), |message| Err(RecordedBackendError(message)))
        })
    }

    fn unmount<'a>(&'a self, mount_path: &'a Utf8Path) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.begin();
            self.pause().await;
            let failure = {
                let mut state = lock(&self.state);
                state.unmounts.push(mount_path.to_path_buf());
                state.unmount_failures.pop_front()
            };
            self.finish();
            failure.map_or(Ok(()), |message| Err(RecordedBackendError(message)))
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
