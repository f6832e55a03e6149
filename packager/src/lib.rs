use std::path::{Path, PathBuf};
use std::process::Stdio;

use truapi_core::prelude::{LaunchError, LaunchResult};

mod options;

pub use options::PackOptions;

/// Default packaging command. `npm pack` prints the name of the tarball it wrote as the last
/// line of its output.
pub const DEFAULT_PACK_COMMAND: &str = "npm pack";

/// Runs the packaging command and resolves the artifact it produced.
pub struct Packager {
    options: PackOptions,
}

impl From<PackOptions> for Packager {
    fn from(options: PackOptions) -> Self {
        Self { options }
    }
}

impl Packager {
    /// Package the working directory and return the path of the artifact.
    ///
    /// If the options name an existing artifact then no command is run.
    pub async fn pack(&self) -> LaunchResult<PathBuf> {
        if let Some(artifact) = &self.options.artifact {
            log::info!("using prebuilt artifact {}", artifact.display());
            return existing_artifact(&self.options.working_dir, artifact);
        }

        let mut parts = self.options.command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            LaunchError::local_io(
                "pack",
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty packaging command"),
            )
        })?;

        log::info!("creating artifact with `{}`...", self.options.command);

        let output = tokio::process::Command::new(program)
            .args(parts)
            .current_dir(&self.options.working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| LaunchError::local_io("pack", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LaunchError::local_io(
                "pack",
                std::io::Error::other(format!(
                    "`{}` exited with {}: {}",
                    self.options.command,
                    output.status,
                    stderr.trim()
                )),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let artifact_name = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| {
                LaunchError::local_io(
                    "pack",
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("`{}` did not report an artifact", self.options.command),
                    ),
                )
            })?;

        let artifact = existing_artifact(&self.options.working_dir, Path::new(artifact_name))?;
        log::info!("created artifact {}", artifact.display());

        Ok(artifact)
    }
}

fn existing_artifact(working_dir: &Path, artifact: &Path) -> LaunchResult<PathBuf> {
    let resolved = working_dir.join(artifact);
    if !resolved.is_file() {
        return Err(LaunchError::local_io(
            "pack",
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("artifact not found at {}", resolved.display()),
            ),
        ));
    }

    Ok(resolved)
}
