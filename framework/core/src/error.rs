use std::path::PathBuf;

/// Shown to the operator when the remote service keeps redirecting, which is how it rejects
/// bad credentials.
pub const REDIRECT_LIMIT_HINT: &str =
    "Exceeded maxRedirects. Please verify you have specified a correct username, password and tenant id.";

/// Result type used by every step of the provisioning workflow.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// The terminal error of a workflow step.
///
/// Every component returns this type unchanged so that the first failure is the one reported to
/// the operator.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// A remote call failed, either in transport or with a non-success status.
    #[error("{operation} failed: {cause}")]
    Remote {
        /// The label of the failed operation, e.g. `create test`.
        operation: String,
        /// The HTTP status, if a response was received at all.
        status: Option<u16>,
        cause: String,
    },

    /// Reading the artifact or running the packaging command failed.
    #[error("{operation} failed: {source}")]
    LocalIo {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote service rejected the session.
    #[error("Error: {hint}")]
    Auth { hint: String },

    /// The local configuration file is missing or malformed.
    #[error("invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// A workflow step was attempted before its precondition was reached.
    #[error("cannot {step} before the workflow reaches {required}, currently at {actual}")]
    OutOfOrder {
        step: &'static str,
        required: String,
        actual: String,
    },
}

impl LaunchError {
    pub fn remote(operation: &str, status: Option<u16>, cause: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.to_string(),
            status,
            cause: cause.into(),
        }
    }

    pub fn local_io(operation: &str, source: std::io::Error) -> Self {
        Self::LocalIo {
            operation: operation.to_string(),
            source,
        }
    }

    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The credential hint raised when the redirect limit is exceeded.
    pub fn redirect_limit() -> Self {
        Self::Auth {
            hint: REDIRECT_LIMIT_HINT.to_string(),
        }
    }

    /// The operation label of a remote failure.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Remote { operation, .. } | Self::LocalIo { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
