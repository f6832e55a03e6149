mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{LaunchError, LaunchResult, REDIRECT_LIMIT_HINT};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
