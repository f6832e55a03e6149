use chrono::Utc;
use truapi_client::prelude::{LoadTestClient, ResourceId, RunRef};
use truapi_core::prelude::LaunchResult;

use crate::context::{WorkflowContext, WorkflowState};

pub struct RunLauncher<'a> {
    client: &'a LoadTestClient,
}

impl<'a> RunLauncher<'a> {
    pub fn new(client: &'a LoadTestClient) -> Self {
        Self { client }
    }

    /// Start the test recorded in `ctx`, with email notification disabled.
    ///
    /// Fails with an out of order error, without calling the service, unless both the policy and
    /// the distribution have been applied.
    pub async fn launch(&self, ctx: &WorkflowContext) -> LaunchResult<RunRef> {
        let step = "launch the run";
        ctx.require(step, WorkflowState::GeographyApplied)?;
        let test_id = ctx.test_id(step)?;

        log::info!("starting run for test {test_id}...");
        let created = self.client.start_run(test_id).await?;
        log::info!("started run {}", created.id);

        Ok(RunRef {
            id: created.id,
            started_at: Utc::now(),
        })
    }

    pub async fn stop(&self, run_id: &ResourceId) -> LaunchResult<()> {
        log::info!("stopping run {run_id}...");
        self.client.stop_run(run_id).await?;
        log::info!("stopped run {run_id}");

        Ok(())
    }
}
