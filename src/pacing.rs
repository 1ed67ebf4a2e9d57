use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Randomized delay between `min` and `max`, applied after each page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(
            Duration::from_secs_f64(min.max(0.0)),
            Duration::from_secs_f64(max.max(0.0)),
        )
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn next_delay(&self) -> Duration {
        let spread = self.max.saturating_sub(self.min).as_millis() as u64;
        if spread == 0 {
            return self.min;
        }
        self.min + Duration::from_millis(fastrand::u64(0..=spread))
    }

    /// Sleep for one delay, returning early if `cancel` fires.
    pub async fn pause(&self, cancel: &CancellationToken) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_in_bounds() {
        let p = Pacing::from_secs_f64(2.0, 4.0);
        for _ in 0..200 {
            let d = p.next_delay();
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(4));
        }
    }

    #[test]
    fn swapped_bounds_are_normalized() {
        let p = Pacing::from_secs_f64(5.0, 1.0);
        assert_eq!(p.min, Duration::from_secs(1));
        assert_eq!(p.max, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_pause_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        Pacing::fixed(Duration::from_secs(30)).pause(&cancel).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
