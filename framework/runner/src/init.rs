use crate::cli::TruapiCli;
use clap::Parser;

/// Initialise the CLI and logging for the `truapi` binary.
pub fn init() -> TruapiCli {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    TruapiCli::parse()
}
