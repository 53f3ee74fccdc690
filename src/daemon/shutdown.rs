use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the process. This works with limited success.
///
/// On Windows detached processes can't detect signals sent to them, so `devtempo stop` kills the
/// daemon instead.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}
