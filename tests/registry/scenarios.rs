//! BDD scenarios for the registry lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RegistryContext, registry_context};

#[scenario(
    path = "tests/features/registry.feature",
    name = "Shared mounts reach the backend once"
)]
fn scenario_shared_mounts(registry_context: RegistryContext) {
    let _ = registry_context;
}

#[scenario(
    path = "tests/features/registry.feature",
    name = "Refuse to remove a volume in use"
)]
fn scenario_remove_in_use(registry_context: RegistryContext) {
    let _ = registry_context;
}

#[scenario(
    path = "tests/features/registry.feature",
    name = "Remove an idle volume"
)]
fn scenario_remove_idle(registry_context: RegistryContext) {
    let _ = registry_context;
}

#[scenario(
    path = "tests/features/registry.feature",
    name = "Retry after a failed mount"
)]
fn scenario_retry_failed_mount(registry_context: RegistryContext) {
    let _ = registry_context;
}

#[scenario(
    path = "tests/features/registry.feature",
    name = "Keep the holder when unmount fails"
)]
fn scenario_failed_unmount(registry_context: RegistryContext) {
    let _ = registry_context;
}
