mod applier;
mod cli;
mod config;
mod context;
mod init;
mod launcher;
mod locator;
mod progress;
mod provisioner;
mod reporter;
mod run;
mod shutdown;
mod types;
mod workflow;

pub mod prelude {
    pub use crate::applier::{distribution_updates, ConfigurationApplier};
    pub use crate::cli::{Command, ConnectionArgs, ReportArgs, RunArgs, TruapiCli};
    pub use crate::config::{load_config, Policy, RemoteConfig, DEFAULT_CONFIG_PATH};
    pub use crate::context::{ScriptBinding, ScriptOrigin, WorkflowContext, WorkflowState};
    pub use crate::init::init;
    pub use crate::launcher::RunLauncher;
    pub use crate::locator::ResourceLocator;
    pub use crate::provisioner::ResourceProvisioner;
    pub use crate::reporter::{
        build_query, finish_time, format_offset, is_terminal, locations, RunHandoff, RunSnapshot,
        StatusReporter, TERMINAL_STATUSES,
    };
    pub use crate::run::run;
    pub use crate::types::TruapiResult;
    pub use crate::workflow::{stop_run, Orchestrator};
}
