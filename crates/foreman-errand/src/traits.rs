//! Collaborator traits of the errand lifecycle

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use foreman_core::Result;

use crate::instance::{Instance, InstanceGroup};
use crate::result::ErrandResult;

/// Hook the runner invokes once the errand is running on its instance
pub type Continuation<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Work run while an instance group's VMs are up
pub type InstanceWork<'a> = BoxFuture<'a, Result<ErrandResult>>;

/// Local cache of rendered template blobs
pub trait BlobCache: Send + Sync {
    /// Remove every cached blob. Idempotent, and safe on an empty cache.
    fn clean_cache(&self);
}

/// Resolved deployment state an errand runs against
pub trait DeploymentPlanner: Send + Sync {
    /// Name of the planned deployment
    fn deployment_name(&self) -> &str;

    /// Look up an instance group by name
    fn instance_group(&self, name: &str) -> Option<InstanceGroup>;

    /// Whether an errand must run: its configuration changed or its last run
    /// did not succeed
    fn errand_needs_run(&self, errand_name: &str) -> bool;

    /// Blob cache shared by everything operating on this deployment
    fn template_blob_cache(&self) -> Arc<dyn BlobCache>;
}

/// VM operations on one instance group
#[async_trait]
pub trait InstanceGroupManager: Send + Sync {
    /// Create VMs for instances that do not have one yet
    async fn create_missing_vms(&self) -> Result<()>;

    /// Apply the group's current configuration to its instances
    async fn update_instances(&self) -> Result<()>;

    /// Delete every VM of the group
    async fn delete_vms(&self) -> Result<()>;
}

/// Provisions errand VMs around a unit of work
#[async_trait]
pub trait ErrandInstanceUpdater: Send + Sync {
    /// Make sure the errand's VMs exist and are up to date. On failure VMs
    /// created so far are deleted unless `keep_alive`.
    async fn create_vms(&self, keep_alive: bool) -> Result<()>;

    /// Run `body` with the instances updated, then tear VMs down unless
    /// `keep_alive`. Teardown happens whether or not `body` fails.
    async fn with_updated_instances<'a>(
        &'a self,
        keep_alive: bool,
        body: InstanceWork<'a>,
    ) -> Result<ErrandResult>;
}

/// Executes an errand command on an instance
#[async_trait]
pub trait ErrandRunner: Send + Sync {
    /// Run the errand, invoking `on_ready` once it started
    async fn run<'a>(
        &'a self,
        instance: &'a Instance,
        on_ready: Continuation<'a>,
    ) -> Result<ErrandResult>;
}
