//! Contracts for the external services the control loop depends on.
//!
//! Telemetry and instance resizing live outside tierscale (a cloud provider's
//! monitoring and compute APIs in production, simulations in tests). Both are
//! injected into the roles as trait objects.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::CollaboratorResult;
use crate::types::RawTelemetry;

/// Boxed future returned by collaborator calls.
pub type CollaboratorFuture<'a, T> =
    Pin<Box<dyn Future<Output = CollaboratorResult<T>> + Send + 'a>>;

/// Source of per-instance resource telemetry.
pub trait MetricSource: Send + Sync {
    /// Fetch the latest telemetry for `instance_id` over the trailing `window`.
    ///
    /// Implementations return `None` for series they could not read rather
    /// than failing the whole call.
    fn fetch<'a>(
        &'a self,
        instance_id: &'a str,
        window: Duration,
    ) -> CollaboratorFuture<'a, RawTelemetry>;
}

/// Reads and changes the size tier of an instance.
pub trait InstanceController: Send + Sync {
    /// Name of the tier the instance currently runs at.
    fn get_current_tier<'a>(&'a self, instance_id: &'a str) -> CollaboratorFuture<'a, String>;

    /// Resize the instance to `tier`. Resolves once the resize has completed.
    fn set_tier<'a>(&'a self, instance_id: &'a str, tier: &'a str) -> CollaboratorFuture<'a, ()>;
}
