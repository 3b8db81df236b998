use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::SpaceError;

/// Runs `op`; if the backend reports a rate limit, waits `backoff` and runs
/// it exactly once more. Any other error, or a second failure, is returned.
pub async fn retry_once_on_rate_limit<T, F, Fut>(
  backoff: Duration,
  label: &str,
  mut op: F,
) -> Result<T, SpaceError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, SpaceError>>,
{
  match op().await {
    Err(e) if e.is_rate_limited() => {
      warn!(
        "rate limited on {label}, waiting {}s before retrying",
        backoff.as_secs()
      );
      tokio::time::sleep(backoff).await;
      op().await
    }
    other => other,
  }
}
