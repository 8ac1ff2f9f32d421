//! Bounded-retry fire-and-forget tasks (§9): the upstream module's background note-extraction
//! was a bare `asyncio.create_task` with no retry and no visibility into failure. Here a spawned
//! job retries with backoff up to a small cap and logs its final outcome instead of silently
//! swallowing an error.

use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Spawns `make_attempt` (invoked fresh on every retry) up to [`MAX_ATTEMPTS`] times with
/// doubling backoff, logging via `tracing` on final failure. Never panics the caller's task.
pub fn spawn_bounded_retry<F, Fut, E>(label: &'static str, make_attempt: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = BASE_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            match make_attempt().await {
                Ok(()) => return,
                Err(err) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(label, attempt, %err, "background task failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    tracing::error!(label, attempt, %err, "background task exhausted retries");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_until_success_within_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        spawn_bounded_retry::<_, _, String>("test", move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(())
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        spawn_bounded_retry::<_, _, String>("test", move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("always fails".to_string())
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(calls.load(Ordering::SeqCst) <= MAX_ATTEMPTS);
    }
}
