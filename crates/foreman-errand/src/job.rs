//! `run_errand` task job

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use foreman_core::{ErrandError, Result};
use foreman_tasks::{Job, JobArgs, JobContext, JobFactory, TaskCheckpoint};

use crate::instance::{Instance, InstanceGroup};
use crate::lifecycle::{ErrandStepOptions, LifecycleErrandStep};
use crate::traits::{DeploymentPlanner, ErrandRunner, InstanceGroupManager};
use crate::updater::ManagedInstanceUpdater;

/// Job type of errand tasks
pub const RUN_ERRAND_JOB: &str = "run_errand";

/// Collaborators an errand job resolves at run time
///
/// The runner and the instance group manager receive the task's checkpoint
/// so long running provisioning or errand commands can observe a cancel.
pub trait ErrandContext: Send + Sync {
    /// Plan the named deployment
    fn planner(&self, deployment_name: &str) -> Result<Arc<dyn DeploymentPlanner>>;

    /// Runner executing errand commands on behalf of the task
    fn runner(&self, checkpoint: TaskCheckpoint) -> Arc<dyn ErrandRunner>;

    /// Manager for the VMs of one instance group
    fn instance_group_manager(
        &self,
        planner: &Arc<dyn DeploymentPlanner>,
        group: &InstanceGroup,
        checkpoint: TaskCheckpoint,
    ) -> Arc<dyn InstanceGroupManager>;
}

/// Runs one errand as a task
///
/// The task result is the errand's short description.
pub struct RunErrandJob {
    context: Arc<dyn ErrandContext>,
    deployment_name: String,
    errand_name: String,
    keep_alive: bool,
    when_changed: bool,
}

impl RunErrandJob {
    pub fn new(
        context: Arc<dyn ErrandContext>,
        deployment_name: impl Into<String>,
        errand_name: impl Into<String>,
        keep_alive: bool,
        when_changed: bool,
    ) -> Self {
        Self {
            context,
            deployment_name: deployment_name.into(),
            errand_name: errand_name.into(),
            keep_alive,
            when_changed,
        }
    }

    fn build_step(&self, checkpoint: TaskCheckpoint) -> Result<LifecycleErrandStep> {
        let planner = self.context.planner(&self.deployment_name)?;

        let group = planner
            .instance_group(&self.errand_name)
            .ok_or_else(|| ErrandError::NotAnErrand(self.errand_name.clone()))?;
        // A group without instances yet gets its first one from create_vms
        let instance = group
            .instances
            .first()
            .cloned()
            .unwrap_or_else(|| Instance::new(group.name.clone(), 0));

        let skip_errand = self.when_changed && !planner.errand_needs_run(&self.errand_name);
        let manager = self
            .context
            .instance_group_manager(&planner, &group, checkpoint.clone());
        let updater = Arc::new(
            ManagedInstanceUpdater::new(
                manager,
                self.errand_name.clone(),
                self.deployment_name.clone(),
            )
            .with_checkpoint(checkpoint.clone()),
        );

        Ok(LifecycleErrandStep::new(
            self.context.runner(checkpoint),
            planner,
            instance,
            group,
            updater,
            ErrandStepOptions {
                errand_name: self.errand_name.clone(),
                deployment_name: self.deployment_name.clone(),
                skip_errand,
                keep_alive: self.keep_alive,
            },
        ))
    }
}

#[async_trait]
impl Job for RunErrandJob {
    fn job_type(&self) -> &'static str {
        RUN_ERRAND_JOB
    }

    async fn perform(&mut self, ctx: &JobContext) -> Result<Value> {
        let step = self.build_step(ctx.checkpoint_handle())?;

        ctx.checkpoint().await?;
        let prepared = step.prepare().await?;

        ctx.checkpoint().await?;
        let errand_name = self.errand_name.as_str();
        let result = prepared
            .run(Box::new(move || info!(errand = errand_name, "Errand is running")))
            .await?;

        Ok(Value::String(result.short_description()))
    }
}

/// Builds [`RunErrandJob`]s from
/// `[deployment_name, errand_name, keep_alive, when_changed]`.
/// The two flags are optional and default to `false`.
pub struct RunErrandJobFactory {
    context: Arc<dyn ErrandContext>,
}

impl RunErrandJobFactory {
    pub fn new(context: Arc<dyn ErrandContext>) -> Self {
        Self { context }
    }
}

impl JobFactory for RunErrandJobFactory {
    fn job_type(&self) -> &'static str {
        RUN_ERRAND_JOB
    }

    fn build(&self, args: JobArgs) -> Result<Box<dyn Job>> {
        let flag = |index: usize| -> Result<bool> {
            if args.len() > index {
                args.get(index)
            } else {
                Ok(false)
            }
        };

        Ok(Box::new(RunErrandJob::new(
            self.context.clone(),
            args.get::<String>(0)?,
            args.get::<String>(1)?,
            flag(2)?,
            flag(3)?,
        )))
    }
}
