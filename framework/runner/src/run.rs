use std::sync::Arc;

use anyhow::Context;
use truapi_client::prelude::{ConnectionOptions, ResourceId, Session};
use truapi_core::prelude::ShutdownHandle;
use truapi_instruments::Reporter;
use truapi_packager::PackOptions;

use crate::cli::{Command, ReportArgs, RunArgs, TruapiCli};
use crate::config::load_config;
use crate::context::WorkflowContext;
use crate::reporter::{RunHandoff, StatusReporter};
use crate::shutdown::start_shutdown_listener;
use crate::types::TruapiResult;
use crate::workflow::{stop_run, Orchestrator};

/// Run the command selected on the command line. The summary of remote calls is logged however
/// the command ends.
pub fn run(cli: TruapiCli) -> TruapiResult<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let reporter = Arc::new(Reporter::new());
    let connection = cli.connection.options()?;

    let result = runtime.block_on(async {
        match cli.command {
            Command::Run(args) => {
                run_workflow(connection, args, &shutdown_handle, reporter.clone()).await
            }
            Command::Stop { run_id } => {
                let session = Session::login(connection).await?;
                stop_run(session, &run_id, reporter.clone()).await?;
                Ok(())
            }
            Command::Status { run_id, report } => {
                let session = Session::login(connection).await?;
                follow_run(
                    RunHandoff::new(session, run_id),
                    &report,
                    &shutdown_handle,
                    reporter.clone(),
                )
                .await
            }
        }
    });

    reporter.finalize();

    result
}

async fn run_workflow(
    connection: ConnectionOptions,
    args: RunArgs,
    shutdown_handle: &ShutdownHandle,
    reporter: Arc<Reporter>,
) -> TruapiResult<()> {
    // Before logging in, so that a bad file changes nothing on the service.
    let config = load_config(&args.config)?;

    let pack_options = PackOptions::default()
        .command(&args.pack_command)
        .artifact(args.artifact.clone());

    let orchestrator = Orchestrator::new(connection, config, pack_options, reporter.clone());
    let mut ctx = WorkflowContext::new();
    let handoff = orchestrator.execute(&mut ctx).await?;

    println!("{}", handoff.run_id);

    if args.no_report {
        log::info!("not following run {}", handoff.run_id);
        return Ok(());
    }

    follow_run(handoff, &args.report, shutdown_handle, reporter).await
}

async fn follow_run(
    handoff: RunHandoff,
    report: &ReportArgs,
    shutdown_handle: &ShutdownHandle,
    reporter: Arc<Reporter>,
) -> TruapiResult<()> {
    let run_id: ResourceId = handoff.run_id.clone();

    StatusReporter::new(handoff, reporter, report.poll_interval())
        .show_progress(!report.no_progress)
        .follow(shutdown_handle.new_listener())
        .await
        .with_context(|| format!("Failed to follow run {run_id}"))?;

    Ok(())
}
