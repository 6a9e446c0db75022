//! Errand instance updater backed by an instance group manager

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use foreman_core::Result;
use foreman_tasks::TaskCheckpoint;

use crate::result::ErrandResult;
use crate::traits::{ErrandInstanceUpdater, InstanceGroupManager, InstanceWork};

/// Creates and updates errand VMs through an [`InstanceGroupManager`] and
/// deletes them after the errand unless keep-alive is requested.
pub struct ManagedInstanceUpdater {
    manager: Arc<dyn InstanceGroupManager>,
    errand_name: String,
    deployment_name: String,
    checkpoint: Option<TaskCheckpoint>,
}

impl ManagedInstanceUpdater {
    pub fn new(
        manager: Arc<dyn InstanceGroupManager>,
        errand_name: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            errand_name: errand_name.into(),
            deployment_name: deployment_name.into(),
            checkpoint: None,
        }
    }

    /// Check for cancellation between provisioning steps
    pub fn with_checkpoint(mut self, checkpoint: TaskCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    async fn cleanup_vms(&self, keep_alive: bool) -> Result<()> {
        if keep_alive {
            info!("Skipping vms deletion, keep-alive is set");
            return Ok(());
        }
        info!("Deleting errand instances");
        self.manager.delete_vms().await
    }

    async fn provision(&self) -> Result<()> {
        info!("Creating missing vms");
        self.manager.create_missing_vms().await?;
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.check().await?;
        }
        info!("Updating instances");
        self.manager.update_instances().await
    }

    /// Teardown after a fault. The original fault wins, so a teardown
    /// error is only logged.
    async fn cleanup_after_fault(&self, keep_alive: bool) {
        if let Err(cleanup) = self.cleanup_vms(keep_alive).await {
            error!(
                errand = %self.errand_name,
                deployment = %self.deployment_name,
                error = %cleanup,
                "Failed to delete errand instances"
            );
        }
    }
}

#[async_trait]
impl ErrandInstanceUpdater for ManagedInstanceUpdater {
    #[instrument(skip(self), fields(errand = %self.errand_name, deployment = %self.deployment_name))]
    async fn create_vms(&self, keep_alive: bool) -> Result<()> {
        if let Err(e) = self.provision().await {
            // Partially created VMs are torn down like after a run
            self.cleanup_after_fault(keep_alive).await;
            return Err(e);
        }
        Ok(())
    }

    async fn with_updated_instances<'a>(
        &'a self,
        keep_alive: bool,
        body: InstanceWork<'a>,
    ) -> Result<ErrandResult> {
        match body.await {
            Ok(result) => {
                self.cleanup_vms(keep_alive).await?;
                Ok(result)
            }
            Err(e) => {
                self.cleanup_after_fault(keep_alive).await;
                Err(e)
            }
        }
    }
}
