use rand::Rng;
use std::time::Duration;

/// Random duration in `[min, max]` seconds with millisecond resolution.
/// A reversed range is treated as its normalized form.
pub fn jitter(range_s: (u64, u64)) -> Duration {
    let (lo, hi) = if range_s.0 <= range_s.1 {
        range_s
    } else {
        (range_s.1, range_s.0)
    };
    let ms = rand::thread_rng().gen_range(lo * 1000..=hi * 1000);
    Duration::from_millis(ms)
}

/// Sleep for a [`jitter`] duration and return how long that was.
pub async fn pause(range_s: (u64, u64)) -> Duration {
    let wait = jitter(range_s);
    tokio::time::sleep(wait).await;
    wait
}
