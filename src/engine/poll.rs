use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Run `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The probe always runs at least once, and once more at the deadline, so a
/// zero timeout is a single check. Each wait is a suspension point, so a
/// cancelled caller stops polling at the next tick.
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep((deadline - now).min(interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_value() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let found = poll_until(Duration::from_secs(1), Duration::from_secs(10), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            (n == 3).then_some(n)
        })
        .await;
        assert_eq!(found, Some(3));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let found: Option<()> = poll_until(Duration::from_secs(2), Duration::from_secs(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        })
        .await;
        assert!(found.is_none());
        assert!(start.elapsed() >= Duration::from_secs(5));
        // t=0, 2, 4, 5
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_checks_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let found: Option<()> = poll_until(Duration::from_secs(1), Duration::ZERO, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        })
        .await;
        assert!(found.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
