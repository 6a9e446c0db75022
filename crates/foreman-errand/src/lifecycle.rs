//! Errand lifecycle step
//!
//! Running an errand happens in two phases. [`LifecycleErrandStep::prepare`]
//! provisions the errand's VMs and yields a [`PreparedErrandStep`], whose
//! [`run`](PreparedErrandStep::run) executes the errand and cleans the
//! deployment's template blob cache. Both phases consume the step, so each
//! runs at most once and always in that order.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use foreman_core::{ErrandError, Result};

use crate::instance::{Instance, InstanceGroup};
use crate::result::ErrandResult;
use crate::traits::{
    BlobCache, Continuation, DeploymentPlanner, ErrandInstanceUpdater, ErrandRunner, InstanceWork,
};

/// Per invocation settings of an errand step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrandStepOptions {
    pub errand_name: String,
    pub deployment_name: String,
    /// The errand is unchanged since its last successful run
    pub skip_errand: bool,
    /// Leave the errand's VMs running afterwards
    pub keep_alive: bool,
}

/// An errand step that has not provisioned anything yet
pub struct LifecycleErrandStep {
    runner: Arc<dyn ErrandRunner>,
    planner: Arc<dyn DeploymentPlanner>,
    instance: Instance,
    instance_group: InstanceGroup,
    updater: Arc<dyn ErrandInstanceUpdater>,
    options: ErrandStepOptions,
}

impl LifecycleErrandStep {
    pub fn new(
        runner: Arc<dyn ErrandRunner>,
        planner: Arc<dyn DeploymentPlanner>,
        instance: Instance,
        instance_group: InstanceGroup,
        updater: Arc<dyn ErrandInstanceUpdater>,
        options: ErrandStepOptions,
    ) -> Self {
        Self {
            runner,
            planner,
            instance,
            instance_group,
            updater,
            options,
        }
    }

    /// Create the errand's VMs, unless the errand is skipped.
    ///
    /// Fails without touching anything when the instance group does not have
    /// the errand lifecycle.
    #[instrument(skip_all, fields(errand = %self.options.errand_name, deployment = %self.options.deployment_name))]
    pub async fn prepare(self) -> Result<PreparedErrandStep> {
        if !self.instance_group.is_errand() {
            return Err(ErrandError::NotAnErrand(self.instance_group.name.clone()).into());
        }
        if !self.options.skip_errand {
            self.updater.create_vms(self.options.keep_alive).await?;
        }
        Ok(PreparedErrandStep { step: self })
    }
}

/// An errand step whose VMs are provisioned
pub struct PreparedErrandStep {
    step: LifecycleErrandStep,
}

impl PreparedErrandStep {
    /// Run the errand, invoking `continuation` once it is running.
    ///
    /// A skipped errand returns the did-not-run result and touches nothing.
    /// Otherwise the template blob cache is cleaned before this returns,
    /// whether the errand succeeds or fails.
    #[instrument(skip_all, fields(errand = %self.step.options.errand_name, instance = %self.step.instance))]
    pub async fn run(self, continuation: Continuation<'_>) -> Result<ErrandResult> {
        let step = self.step;
        if step.options.skip_errand {
            info!("Skip running errand because since last errand run was successful and there have been no changes to job configuration");
            return Ok(ErrandResult::skipped(&step.options.errand_name));
        }

        let _cleanup = CacheCleanup(step.planner.template_blob_cache());

        let runner = &step.runner;
        let instance = &step.instance;
        let body: InstanceWork<'_> = Box::pin(async move { runner.run(instance, continuation).await });

        let result = step
            .updater
            .with_updated_instances(step.options.keep_alive, body)
            .await?;
        info!(exit_code = result.exit_code, "{}", result.short_description());
        Ok(result)
    }
}

/// Cleans the blob cache when dropped
struct CacheCleanup(Arc<dyn BlobCache>);

impl Drop for CacheCleanup {
    fn drop(&mut self) {
        debug!("cleaning template blob cache");
        self.0.clean_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use foreman_core::ForemanError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Shared call log across all fakes, to assert ordering
    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl Calls {
        fn push(&self, call: impl Into<String>) {
            self.0.lock().unwrap().push(call.into());
        }

        fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, call: &str) -> usize {
            self.all().iter().filter(|c| *c == call).count()
        }
    }

    struct FakeCache(Arc<Calls>);

    impl BlobCache for FakeCache {
        fn clean_cache(&self) {
            self.0.push("clean_cache");
        }
    }

    struct FakePlanner(Arc<Calls>);

    impl DeploymentPlanner for FakePlanner {
        fn deployment_name(&self) -> &str {
            "deployment-name"
        }

        fn instance_group(&self, _name: &str) -> Option<InstanceGroup> {
            None
        }

        fn errand_needs_run(&self, _errand_name: &str) -> bool {
            true
        }

        fn template_blob_cache(&self) -> Arc<dyn BlobCache> {
            Arc::new(FakeCache(self.0.clone()))
        }
    }

    struct FakeUpdater {
        calls: Arc<Calls>,
        fail_create: bool,
        fail_update: bool,
    }

    #[async_trait]
    impl ErrandInstanceUpdater for FakeUpdater {
        async fn create_vms(&self, keep_alive: bool) -> Result<()> {
            self.calls.push(format!("create_vms({})", keep_alive));
            if self.fail_create {
                return Err(ForemanError::other("OMG"));
            }
            Ok(())
        }

        async fn with_updated_instances<'a>(
            &'a self,
            keep_alive: bool,
            body: InstanceWork<'a>,
        ) -> Result<ErrandResult> {
            self.calls
                .push(format!("with_updated_instances({})", keep_alive));
            if self.fail_update {
                return Err(ForemanError::other("omg"));
            }
            body.await
        }
    }

    struct FakeRunner {
        calls: Arc<Calls>,
        exit_code: i32,
        fail: bool,
    }

    #[async_trait]
    impl ErrandRunner for FakeRunner {
        async fn run<'a>(
            &'a self,
            instance: &'a Instance,
            on_ready: Continuation<'a>,
        ) -> Result<ErrandResult> {
            self.calls.push(format!("run({})", instance));
            if self.fail {
                return Err(ForemanError::other("agent unreachable"));
            }
            on_ready();
            Ok(ErrandResult::new("errand_name", self.exit_code))
        }
    }

    struct Scenario {
        skip_errand: bool,
        keep_alive: bool,
        fail_create: bool,
        fail_update: bool,
        fail_run: bool,
        service_group: bool,
        exit_code: i32,
    }

    impl Default for Scenario {
        fn default() -> Self {
            Self {
                skip_errand: false,
                keep_alive: false,
                fail_create: false,
                fail_update: false,
                fail_run: false,
                service_group: false,
                exit_code: 0,
            }
        }
    }

    impl Scenario {
        fn build(self, calls: &Arc<Calls>) -> LifecycleErrandStep {
            let mut group = InstanceGroup::errand("errand_name", 1);
            if self.service_group {
                group.lifecycle = crate::instance::Lifecycle::Service;
            }
            LifecycleErrandStep::new(
                Arc::new(FakeRunner {
                    calls: calls.clone(),
                    exit_code: self.exit_code,
                    fail: self.fail_run,
                }),
                Arc::new(FakePlanner(calls.clone())),
                Instance::new("errand_name", 0),
                group,
                Arc::new(FakeUpdater {
                    calls: calls.clone(),
                    fail_create: self.fail_create,
                    fail_update: self.fail_update,
                }),
                ErrandStepOptions {
                    errand_name: "errand_name".to_string(),
                    deployment_name: "deployment-name".to_string(),
                    skip_errand: self.skip_errand,
                    keep_alive: self.keep_alive,
                },
            )
        }
    }

    #[tokio::test]
    async fn test_prepare_passes_keep_alive() {
        for keep_alive in [true, false] {
            let calls = Arc::new(Calls::default());
            Scenario {
                keep_alive,
                ..Scenario::default()
            }
            .build(&calls)
            .prepare()
            .await
            .unwrap();
            assert_eq!(calls.all(), vec![format!("create_vms({})", keep_alive)]);
        }
    }

    #[tokio::test]
    async fn test_prepare_propagates_create_failure() {
        let calls = Arc::new(Calls::default());
        let err = Scenario {
            fail_create: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "OMG");
    }

    #[tokio::test]
    async fn test_prepare_skipped_creates_nothing() {
        let calls = Arc::new(Calls::default());
        Scenario {
            skip_errand: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .unwrap();
        assert!(calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_run_skipped_returns_did_not_run() {
        let calls = Arc::new(Calls::default());
        let invoked = AtomicBool::new(false);
        let prepared = Scenario {
            skip_errand: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .unwrap();

        let result = prepared
            .run(Box::new(|| invoked.store(true, Ordering::SeqCst)))
            .await
            .unwrap();

        assert_eq!(result.exit_code, -1);
        assert_eq!(
            result.short_description(),
            "Errand 'errand_name' did not run (no configuration changes)"
        );
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_run_executes_errand_and_cleans_cache() {
        let calls = Arc::new(Calls::default());
        let evidence = AtomicBool::new(false);
        let prepared = Scenario {
            keep_alive: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .unwrap();

        let result = prepared
            .run(Box::new(|| evidence.store(true, Ordering::SeqCst)))
            .await
            .unwrap();

        assert!(evidence.load(Ordering::SeqCst));
        assert_eq!(result.exit_code, 0);
        assert_eq!(
            result.short_description(),
            "Errand 'errand_name' completed successfully (exit code 0)"
        );
        assert_eq!(
            calls.all(),
            vec![
                "create_vms(true)",
                "with_updated_instances(true)",
                "run(errand_name/0)",
                "clean_cache",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_cleans_cache_when_updater_fails() {
        let calls = Arc::new(Calls::default());
        let prepared = Scenario {
            fail_update: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .unwrap();

        let err = prepared.run(Box::new(|| {})).await.unwrap_err();

        assert_eq!(err.to_string(), "omg");
        assert_eq!(calls.count("clean_cache"), 1);
        assert_eq!(calls.count("run(errand_name/0)"), 0);
    }

    #[tokio::test]
    async fn test_run_cleans_cache_when_runner_fails() {
        let calls = Arc::new(Calls::default());
        let invoked = AtomicBool::new(false);
        let prepared = Scenario {
            fail_run: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .unwrap();

        let err = prepared
            .run(Box::new(|| invoked.store(true, Ordering::SeqCst)))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "agent unreachable");
        assert!(!invoked.load(Ordering::SeqCst));
        assert_eq!(calls.count("run(errand_name/0)"), 1);
        assert_eq!(calls.count("clean_cache"), 1);
    }

    #[tokio::test]
    async fn test_prepare_rejects_service_group() {
        let calls = Arc::new(Calls::default());
        let err = Scenario {
            service_group: true,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .err()
        .unwrap();

        assert_eq!(err.to_string(), "Instance group 'errand_name' is not an errand");
        assert!(calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_run_reports_errand_failure_code() {
        let calls = Arc::new(Calls::default());
        let result = Scenario {
            exit_code: 1,
            ..Scenario::default()
        }
        .build(&calls)
        .prepare()
        .await
        .unwrap()
        .run(Box::new(|| {}))
        .await
        .unwrap();

        assert_eq!(
            result.short_description(),
            "Errand 'errand_name' completed with error (exit code 1)"
        );
        assert_eq!(calls.count("clean_cache"), 1);
    }
}
