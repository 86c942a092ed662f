use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::types::Part;

/// Aggregate upload progress: the arithmetic mean of per-part percentages.
///
/// Parts are not weighted by size, so a short final part counts as much as
/// a full one. Returns 0.0 for an empty list.
pub fn aggregate_percent(parts: &[Part]) -> f64 {
    if parts.is_empty() {
        return 0.0;
    }
    parts.iter().map(|p| p.percent).sum::<f64>() / parts.len() as f64
}

/// Default span of the speed window.
const SPEED_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained speed samples.
const SPEED_MAX_SAMPLES: usize = 100;

/// Sliding-window throughput estimate shared by concurrent part transfers.
pub struct SpeedCalculator {
    window: Duration,
    max_samples: usize,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(SPEED_WINDOW, SPEED_MAX_SAMPLES)
    }
}

impl SpeedCalculator {
    /// Keeps at most `max_samples` samples no older than `window`.
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            window,
            max_samples: max_samples.max(2),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let now = Instant::now();
        let mut samples = self.lock();
        samples.push_back((now, bytes));
        while let Some(&(at, _)) = samples.front()
            && (now.duration_since(at) > self.window || samples.len() > self.max_samples)
        {
            samples.pop_front();
        }
    }

    /// Bytes per second across the window; 0.0 until two samples span time.
    pub fn bytes_per_second(&self) -> f64 {
        let samples = self.lock();
        let (Some(&(first, _)), Some(&(last, _))) = (samples.front(), samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(first);
        if elapsed.is_zero() {
            return 0.0;
        }
        samples.iter().map(|&(_, bytes)| bytes).sum::<u64>() as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining_bytes`, `None` while speed is unknown.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    fn sample_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(Instant, u64)>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartRange;
    use std::sync::Arc;

    fn part(size: u64, loaded: u64) -> Part {
        let mut p = Part::new(
            PartRange {
                index: 0,
                start: 0,
                size,
            },
            "f-0".into(),
        );
        p.set_loaded(loaded);
        p
    }

    #[test]
    fn aggregate_is_unweighted_mean() {
        // A full 100-byte part and an empty 10-byte part average to 50%.
        let parts = vec![part(100, 100), part(10, 0)];
        assert_eq!(aggregate_percent(&parts), 50.0);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        assert_eq!(aggregate_percent(&[]), 0.0);
    }

    #[test]
    fn unknown_speed_without_elapsed_time() {
        let speed = SpeedCalculator::default();
        assert_eq!(speed.bytes_per_second(), 0.0);
        assert!(speed.eta(1000).is_none());

        speed.add_sample(4096);
        assert_eq!(speed.bytes_per_second(), 0.0);
    }

    #[test]
    fn eta_follows_measured_speed() {
        let speed = SpeedCalculator::new(Duration::from_secs(10), 16);
        speed.add_sample(1000);
        std::thread::sleep(Duration::from_millis(40));
        speed.add_sample(1000);

        assert!(speed.bytes_per_second() > 0.0);
        let near = speed.eta(1_000).unwrap();
        let far = speed.eta(100_000).unwrap();
        assert!(far > near);
    }

    #[test]
    fn reset_forgets_history() {
        let speed = SpeedCalculator::default();
        speed.add_sample(10);
        std::thread::sleep(Duration::from_millis(5));
        speed.add_sample(10);
        speed.reset();
        assert_eq!(speed.sample_count(), 0);
        assert_eq!(speed.bytes_per_second(), 0.0);
    }

    #[test]
    fn sample_count_is_capped() {
        let speed = SpeedCalculator::new(Duration::from_secs(60), 4);
        for n in 0..32 {
            speed.add_sample(n);
        }
        assert_eq!(speed.sample_count(), 4);
    }

    #[test]
    fn stale_samples_leave_the_window() {
        let speed = SpeedCalculator::new(Duration::from_millis(20), 64);
        speed.add_sample(1);
        speed.add_sample(1);
        std::thread::sleep(Duration::from_millis(40));
        speed.add_sample(1);
        assert_eq!(speed.sample_count(), 1);
    }

    #[test]
    fn shared_between_threads() {
        let speed = Arc::new(SpeedCalculator::default());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let speed = Arc::clone(&speed);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        speed.add_sample(8);
                        speed.bytes_per_second();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert!(speed.sample_count() <= SPEED_MAX_SAMPLES);
    }
}
