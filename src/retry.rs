//! Bounded retry with exponential backoff for transient collaborator
//! errors (object-store hiccups, TTS rate limits). Exhausting the budget
//! is the caller's signal to negatively acknowledge the message instead.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

const BASE_DELAY: Duration = Duration::from_millis(200);

pub async fn with_backoff<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(attempt, max_attempts, error = %e, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(5, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("transient") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_the_budget() {
        let result: Result<u32, &str> = with_backoff(3, || async { Err("still broken") }).await;
        assert_eq!(result, Err("still broken"));
    }
}
