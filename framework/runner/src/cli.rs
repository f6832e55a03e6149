use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use truapi_client::prelude::{ConnectionOptions, ResourceId};
use truapi_core::prelude::{LaunchError, LaunchResult};
use truapi_packager::DEFAULT_PACK_COMMAND;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "truapi", about, long_about = None)]
pub struct TruapiCli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the service is and who to log in as. Accepted before or after the subcommand.
#[derive(Args)]
pub struct ConnectionArgs {
    /// Base URL of the service, e.g. `https://truapi.example.com/`
    #[arg(long, global = true, env = "TRUAPI_URL")]
    pub url: Option<String>,

    #[arg(long, global = true, env = "TRUAPI_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long, global = true, env = "TRUAPI_USERNAME")]
    pub username: Option<String>,

    #[arg(long, global = true, env = "TRUAPI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Route every call through this proxy
    #[arg(long, global = true, env = "TRUAPI_PROXY")]
    pub proxy: Option<String>,
}

impl ConnectionArgs {
    pub fn options(&self) -> LaunchResult<ConnectionOptions> {
        ConnectionOptions::new(
            required(&self.url, "--url", "TRUAPI_URL")?,
            required(&self.tenant_id, "--tenant-id", "TRUAPI_TENANT_ID")?,
            required(&self.username, "--username", "TRUAPI_USERNAME")?,
            required(&self.password, "--password", "TRUAPI_PASSWORD")?,
            self.proxy.clone(),
        )
    }
}

fn required<'a>(value: &'a Option<String>, flag: &str, env: &str) -> LaunchResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| LaunchError::config(flag, format!("{flag} or {env} must be set")))
}

#[derive(Subcommand)]
pub enum Command {
    /// Package the current directory, provision the test, launch a run and follow it
    Run(RunArgs),

    /// Stop a run
    Stop {
        #[arg(long, value_parser = parse_run_id)]
        run_id: ResourceId,
    },

    /// Follow an existing run
    Status {
        #[arg(long, value_parser = parse_run_id)]
        run_id: ResourceId,

        #[command(flatten)]
        report: ReportArgs,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// The configuration file with the policy and the distribution
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Upload this file instead of packaging the current directory
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// The command that packages the current directory. It must print the artifact path as the
    /// last line of its output.
    #[arg(long, default_value = DEFAULT_PACK_COMMAND)]
    pub pack_command: String,

    /// Exit once the run is launched instead of following it
    #[arg(long, default_value = "false")]
    pub no_report: bool,

    #[command(flatten)]
    pub report: ReportArgs,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Seconds between two polls of the run status
    #[arg(long, default_value = "5")]
    pub poll_interval: u64,

    /// Do not show a spinner while following the run.
    ///
    /// This is recommended for CI/CD environments where the spinner is just adding noise to the logs.
    #[arg(long, default_value = "false")]
    pub no_progress: bool,
}

impl ReportArgs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}

fn parse_run_id(s: &str) -> anyhow::Result<ResourceId> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("run id must not be empty");
    }

    Ok(ResourceId::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = TruapiCli::parse_from([
            "truapi",
            "--url",
            "https://truapi.example.com",
            "--tenant-id",
            "1234",
            "--username",
            "user",
            "--password",
            "secret",
            "run",
        ]);

        let Command::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.config, PathBuf::from("truapi.json"));
        assert_eq!(args.pack_command, "npm pack");
        assert_eq!(args.report.poll_interval(), Duration::from_secs(5));
        assert!(!args.no_report);
    }

    #[test]
    fn stop_takes_a_run_id() {
        let cli = TruapiCli::parse_from([
            "truapi",
            "--url",
            "https://truapi.example.com",
            "--tenant-id",
            "1234",
            "--username",
            "user",
            "--password",
            "secret",
            "stop",
            "--run-id",
            "1001",
        ]);

        assert!(matches!(
            cli.command,
            Command::Stop { run_id: ResourceId::Number(1001) }
        ));
    }

    #[test]
    fn connection_flags_follow_the_subcommand() {
        let cli = TruapiCli::try_parse_from([
            "truapi",
            "run",
            "--url",
            "https://truapi.example.com",
            "--tenant-id",
            "1234",
            "--username",
            "user",
            "--password",
            "secret",
            "--no-report",
        ])
        .expect("flags after the subcommand");

        let options = cli.connection.options().expect("connection options");
        assert_eq!(options.base_url.as_str(), "https://truapi.example.com/");
        assert_eq!(options.tenant_id, "1234");
        assert!(matches!(cli.command, Command::Run(RunArgs { no_report: true, .. })));
    }

    #[test]
    fn missing_connection_flag_is_a_config_error() {
        let args = ConnectionArgs {
            url: Some("https://truapi.example.com".to_string()),
            tenant_id: None,
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            proxy: None,
        };

        let err = args.options().unwrap_err();

        assert!(matches!(err, LaunchError::Config { .. }));
        assert!(err.to_string().contains("--tenant-id"));
    }
}
