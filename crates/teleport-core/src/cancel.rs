use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::TeleportError;

/// Races `fut` against `cancel`.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, TeleportError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TeleportError::Cancelled),
        out = fut => Ok(out),
    }
}
