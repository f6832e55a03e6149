use std::path::PathBuf;

use crate::DEFAULT_PACK_COMMAND;

/// Options for configuring the [`super::Packager`]
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Command to run, split on whitespace. No shell is involved.
    pub command: String,
    /// Directory the command runs in and relative artifact paths resolve against.
    pub working_dir: PathBuf,
    /// Use this artifact instead of running the command.
    pub artifact: Option<PathBuf>,
}

impl Default for PackOptions {
    fn default() -> Self {
        PackOptions {
            command: DEFAULT_PACK_COMMAND.to_string(),
            working_dir: PathBuf::from("."),
            artifact: None,
        }
    }
}

impl PackOptions {
    /// Set `command` option
    pub fn command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    /// Set `working_dir` option
    pub fn working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Set `artifact` option
    pub fn artifact(mut self, path: Option<PathBuf>) -> Self {
        self.artifact = path;
        self
    }
}
