//! Foreman Errand - errand lifecycle orchestration
//!
//! An errand is a one-shot job run on a dedicated instance group. The
//! [`LifecycleErrandStep`] provisions the group's VMs, runs the errand through
//! an [`ErrandRunner`] and guarantees the template blob cache is cleaned.

pub mod blob_cache;
pub mod instance;
pub mod job;
pub mod lifecycle;
pub mod result;
pub mod traits;
pub mod updater;

pub use blob_cache::TemplateBlobCache;
pub use instance::{Instance, InstanceGroup, Lifecycle};
pub use job::{ErrandContext, RunErrandJob, RunErrandJobFactory, RUN_ERRAND_JOB};
pub use lifecycle::{ErrandStepOptions, LifecycleErrandStep, PreparedErrandStep};
pub use result::ErrandResult;
pub use traits::{
    BlobCache, Continuation, DeploymentPlanner, ErrandInstanceUpdater, ErrandRunner,
    InstanceGroupManager, InstanceWork,
};
pub use updater::ManagedInstanceUpdater;
