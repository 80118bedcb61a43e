//! BDD step definitions for registry behaviour.

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{RegistryContext, bucket_options};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

#[given("a registry with a volume named \"{name}\"")]
fn registry_with_volume(
    mut registry_context: RegistryContext,
    name: String,
) -> Result<RegistryContext, StepError> {
    let name = name.trim().to_owned();
    let registry = registry_context.registry.clone();
    let options = bucket_options(&name);
    let volume = name.clone();
    runtime()?
        .block_on(async move { registry.create(&volume, Some(options)).await })
        .map_err(|err| StepError::Assertion(format!("create {name}: {err}")))?;
    registry_context.volume = Some(name);
    Ok(registry_context)
}

#[given("the backend rejects the next mount")]
fn backend_rejects_mount(registry_context: RegistryContext) -> RegistryContext {
    registry_context.backend.fail_next_mount("transport endpoint is not connected");
    registry_context
}

#[given("the backend rejects the next unmount")]
fn backend_rejects_unmount(registry_context: RegistryContext) -> RegistryContext {
    registry_context.backend.fail_next_unmount("target is busy");
    registry_context
}

#[when("the volume is mounted {times:u32} times")]
fn mount_times(
    mut registry_context: RegistryContext,
    times: u32,
) -> Result<RegistryContext, StepError> {
    let registry = registry_context.registry.clone();
    let name = registry_context.volume_name().to_owned();
    let results = runtime()?.block_on(async move {
        let mut results = Vec::new();
        for _ in 0..times {
            results.push(registry.mount(&name).await);
        }
        results
    });
    for result in results {
        registry_context.record(result);
    }
    Ok(registry_context)
}

#[when("the volume is unmounted {times:u32} times")]
fn unmount_times(
    mut registry_context: RegistryContext,
    times: u32,
) -> Result<RegistryContext, StepError> {
    let registry = registry_context.registry.clone();
    let name = registry_context.volume_name().to_owned();
    let results = runtime()?.block_on(async move {
        let mut results = Vec::new();
        for _ in 0..times {
            results.push(registry.unmount(&name).await);
        }
        results
    });
    for result in results {
        registry_context.record(result);
    }
    Ok(registry_context)
}

#[when("I remove the volume")]
fn remove_volume(mut registry_context: RegistryContext) -> Result<RegistryContext, StepError> {
    let registry = registry_context.registry.clone();
    let name = registry_context.volume_name().to_owned();
    let result = runtime()?.block_on(async move { registry.remove(&name).await });
    registry_context.record(result);
    Ok(registry_context)
}

#[then("the backend mounted {mounts:u32} times and unmounted {unmounts:u32} times")]
fn backend_call_counts(
    registry_context: &RegistryContext,
    mounts: u32,
    unmounts: u32,
) -> Result<(), StepError> {
    let observed = (
        registry_context.backend.mount_count(),
        registry_context.backend.unmount_count(),
    );
    if observed == (mounts as usize, unmounts as usize) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {mounts} mounts and {unmounts} unmounts, got {observed:?}"
        )))
    }
}

#[then("the volume has {holders:u32} holders")]
fn volume_holders(registry_context: &RegistryContext, holders: u32) -> Result<(), StepError> {
    let registry = registry_context.registry.clone();
    let name = registry_context.volume_name().to_owned();
    let count = runtime()?
        .block_on(async move { registry.ref_count(&name).await })
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    if count == holders as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {holders} holders, got {count}"
        )))
    }
}

#[then("the mount directory exists")]
fn mount_directory_exists(registry_context: &RegistryContext) -> Result<(), StepError> {
    let path = registry_context
        .mount_root
        .join(registry_context.volume_name());
    if path.is_dir() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{path} should be a directory")))
    }
}

#[then("the mount directory is gone")]
fn mount_directory_gone(registry_context: &RegistryContext) -> Result<(), StepError> {
    let path = registry_context
        .mount_root
        .join(registry_context.volume_name());
    if path.exists() {
        Err(StepError::Assertion(format!("{path} should have been removed")))
    } else {
        Ok(())
    }
}

#[then("the volume is no longer listed")]
fn volume_not_listed(registry_context: &RegistryContext) -> Result<(), StepError> {
    let registry = registry_context.registry.clone();
    let listed = runtime()?.block_on(async move { registry.list().await });
    let name = registry_context.volume_name();
    if listed.iter().any(|info| info.name == name) {
        Err(StepError::Assertion(format!("{name} is still listed")))
    } else {
        Ok(())
    }
}

#[then("the volume is still listed")]
fn volume_listed(registry_context: &RegistryContext) -> Result<(), StepError> {
    let registry = registry_context.registry.clone();
    let listed = runtime()?.block_on(async move { registry.list().await });
    let name = registry_context.volume_name();
    if listed.iter().any(|info| info.name == name) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{name} is missing from the list")))
    }
}

#[then("every operation succeeded")]
fn no_errors(registry_context: &RegistryContext) -> Result<(), StepError> {
    match registry_context.last_error {
        None => Ok(()),
        Some(ref err) => Err(StepError::Assertion(format!("unexpected failure: {err}"))),
    }
}

#[then("an operation failed with \"{kind}\"")]
fn failed_with_kind(registry_context: &RegistryContext, kind: String) -> Result<(), StepError> {
    let Some(err) = registry_context.last_error.as_ref() else {
        return Err(StepError::Assertion(String::from("expected a failure")));
    };
    if err.kind().as_str() == kind.trim() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure kind {kind}, got {} ({err})",
            err.kind()
        )))
    }
}
