use tokio::signal;
use truapi_core::prelude::ShutdownHandle;

/// Fires the returned handle when the operator presses Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C, the run can only be followed to its end: {e}");
            return;
        }
        log::info!("Received shutdown signal, shutting down...");
        listener_handle.shutdown();
    });

    handle
}
