//! Bounded fixed-delay polling.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

/// Poll `probe` up to `retries` times, sleeping `delay` after each miss.
///
/// Returns the 1-based attempt on which the probe first reported `true`,
/// or `None` once the budget is spent. The probe is called exactly
/// `retries` times in the worst case and never again after a hit.
pub async fn poll_until<F, Fut>(retries: u32, delay: Duration, mut probe: F) -> Option<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=retries {
        if probe().await {
            return Some(attempt);
        }
        trace!(attempt, retries, delay_ms = delay.as_millis() as u64, "probe not ready");
        tokio::time::sleep(delay).await;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_hit_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let hit = poll_until(5, Duration::from_millis(1), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                true
            }
        })
        .await;

        assert_eq!(hit, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_exactly_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = tokio::time::Instant::now();
        let hit = poll_until(4, Duration::from_millis(5), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                false
            }
        })
        .await;

        assert_eq!(hit, None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_zero_retries_never_probes() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let hit = poll_until(0, Duration::from_millis(1), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                true
            }
        })
        .await;

        assert_eq!(hit, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
