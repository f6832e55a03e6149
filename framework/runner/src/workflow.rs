use std::sync::Arc;

use truapi_client::prelude::{
    ArtifactRef, ConnectionOptions, LoadTestClient, ResourceId, Session, TEST_NAME,
};
use truapi_core::prelude::{LaunchError, LaunchResult};
use truapi_instruments::Reporter;
use truapi_packager::{PackOptions, Packager};

use crate::applier::ConfigurationApplier;
use crate::config::RemoteConfig;
use crate::context::{WorkflowContext, WorkflowState};
use crate::launcher::RunLauncher;
use crate::provisioner::ResourceProvisioner;
use crate::reporter::RunHandoff;

/// Runs the whole provisioning workflow for one invocation, from login to handoff.
pub struct Orchestrator {
    connection: ConnectionOptions,
    config: RemoteConfig,
    packager: Packager,
    reporter: Arc<Reporter>,
}

impl Orchestrator {
    pub fn new(
        connection: ConnectionOptions,
        config: RemoteConfig,
        pack_options: PackOptions,
        reporter: Arc<Reporter>,
    ) -> Self {
        Self {
            connection,
            config,
            packager: Packager::from(pack_options),
            reporter,
        }
    }

    /// Drive `ctx` from `Authenticating` to `HandedOff`.
    ///
    /// The first failing step ends the workflow: `ctx` moves to `Failed` and the step's error is
    /// returned unchanged. Nothing created on the service so far is cleaned up.
    pub async fn execute(&self, ctx: &mut WorkflowContext) -> LaunchResult<RunHandoff> {
        match self.drive(ctx).await {
            Ok(handoff) => Ok(handoff),
            Err(e) => {
                log::error!("workflow failed at {}: {e}", ctx.state());
                ctx.fail(&e);
                Err(e)
            }
        }
    }

    async fn drive(&self, ctx: &mut WorkflowContext) -> LaunchResult<RunHandoff> {
        ctx.require("log in", WorkflowState::Authenticating)?;
        let session = Session::login(self.connection.clone()).await?;
        ctx.authenticated()?;

        let client = LoadTestClient::new(session, self.reporter.clone());
        let provisioner = ResourceProvisioner::new(&client);

        let artifact_path = self.packager.pack().await?;
        log::info!("artifact ready at {}", artifact_path.display());
        ctx.packaged(artifact_path)?;

        let test = provisioner.ensure_test(TEST_NAME).await?;
        ctx.test_ensured(test)?;

        let artifact = upload_artifact(&client, ctx).await?;
        ctx.artifact_uploaded(artifact)?;

        let step = "ensure the script";
        let test_id = ctx.test_id(step)?.clone();
        let script = provisioner
            .ensure_script(&test_id, ctx.artifact_id(step)?)
            .await?;
        ctx.script_ensured(script.clone())?;

        ConfigurationApplier::new(&client)
            .apply(&test_id, &script, &self.config)
            .await?;
        ctx.policy_applied()?;
        ctx.geography_applied()?;

        let run = RunLauncher::new(&client).launch(ctx).await?;
        let handoff = RunHandoff::new(client.session().clone(), run.id.clone());
        ctx.run_launched(run)?;

        ctx.handed_off()?;
        log::info!("run {} launched, handing off", handoff.run_id);

        Ok(handoff)
    }
}

async fn upload_artifact(
    client: &LoadTestClient,
    ctx: &WorkflowContext,
) -> LaunchResult<ArtifactRef> {
    let path = ctx
        .artifact_path()
        .ok_or_else(|| LaunchError::OutOfOrder {
            step: "upload the artifact",
            required: "a packaged artifact".to_string(),
            actual: ctx.state().to_string(),
        })?
        .to_path_buf();

    log::info!("uploading {}...", path.display());
    let created = client.upload_file(&path).await?;
    log::info!("uploaded artifact {}", created.id);

    Ok(ArtifactRef {
        id: created.id,
        path,
    })
}

/// Stop a run. Needs nothing but a session, the workflow does not have to have run.
pub async fn stop_run(
    session: Session,
    run_id: &ResourceId,
    reporter: Arc<Reporter>,
) -> LaunchResult<()> {
    let client = LoadTestClient::new(session, reporter);

    RunLauncher::new(&client).stop(run_id).await
}
