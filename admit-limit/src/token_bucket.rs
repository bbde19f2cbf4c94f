use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use quanta::Instant;

use crate::BucketConfig;
use crate::Reason;

/// Continuous-refill token bucket for a single client.
///
/// The bucket starts full. Each admission check first credits
/// `elapsed * refill_rate` tokens (capped at `capacity`) and then takes one
/// whole token if there is one. Tokens are fractional, so a half-elapsed
/// refill interval is remembered rather than discarded.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
    /// Fixed point the idle tracker measures from.
    anchor: Instant,
    /// Nanoseconds from `anchor` to the most recent check.
    last_used: AtomicU64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        // A clock that runs backwards credits nothing, and last_refill never
        // moves back, so the same interval can't be credited twice.
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

impl TokenBucket {
    /// Creates a full bucket whose refill clock starts at `now`.
    pub fn new(config: BucketConfig, now: Instant) -> Self {
        Self {
            capacity: config.capacity(),
            refill_rate: config.refill_rate(),
            state: Mutex::new(BucketState {
                tokens: config.capacity(),
                last_refill: now,
            }),
            anchor: now,
            last_used: AtomicU64::new(0),
        }
    }

    /// Refill, then try to take one token.
    ///
    /// On rejection the returned [`Reason`] says how long until a whole token
    /// is available again.
    pub fn process(&self, now: Instant) -> ControlFlow<Reason> {
        self.touch(now);

        let mut state = self.state.lock();
        state.refill(now, self.capacity, self.refill_rate);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            ControlFlow::Continue(())
        } else {
            let deficit = 1.0 - state.tokens;
            let retry_after =
                Duration::try_from_secs_f64(deficit / self.refill_rate).unwrap_or(Duration::MAX);
            ControlFlow::Break(Reason::Overloaded { retry_after })
        }
    }

    /// Returns `true` if a token was taken.
    pub fn try_consume(&self, now: Instant) -> bool {
        self.process(now).is_continue()
    }

    /// Token level as of `now`, without consuming or updating the bucket.
    pub fn tokens(&self, now: Instant) -> f64 {
        let state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_refill);
        (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// How long this bucket has gone without an admission check.
    ///
    /// Reads an atomic only, so it's safe to call while holding the registry
    /// lock.
    pub fn idle_for(&self, now: Instant) -> Duration {
        let now = now.saturating_duration_since(self.anchor).as_nanos() as u64;
        let last = self.last_used.load(Ordering::Acquire);
        Duration::from_nanos(now.saturating_sub(last))
    }

    fn touch(&self, now: Instant) {
        let now = now.saturating_duration_since(self.anchor).as_nanos() as u64;
        self.last_used.fetch_max(now, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::thread;

    use more_asserts::assert_ge;
    use more_asserts::assert_le;
    use quanta::Clock;

    use super::*;

    fn bucket(capacity: f64, refill_rate: f64, clock: &Clock) -> TokenBucket {
        TokenBucket::new(
            BucketConfig::new(capacity, refill_rate).unwrap(),
            clock.now(),
        )
    }

    #[test]
    fn it_bursts_then_refills() {
        let (clock, mock) = Clock::mock();
        let rl = bucket(3.0, 1.0, &clock);

        // 1. Burst up to capacity immediately
        assert!(rl.try_consume(clock.now()));
        assert!(rl.try_consume(clock.now()));
        assert!(rl.try_consume(clock.now()));

        // 2. Fourth request is rejected
        assert!(!rl.try_consume(clock.now()));

        // 3. Exactly one second buys exactly one token
        mock.increment(Duration::from_secs(1));
        assert!(rl.try_consume(clock.now()));
        assert!(!rl.try_consume(clock.now()));
    }

    #[test]
    fn it_remembers_fractional_refill() {
        let (clock, mock) = Clock::mock();
        let rl = bucket(3.0, 1.0, &clock);
        for _ in 0..3 {
            assert!(rl.try_consume(clock.now()));
        }
        assert_eq!(rl.tokens(clock.now()), 0.0);

        mock.increment(Duration::from_millis(500));
        assert!(!rl.try_consume(clock.now()));
        assert_eq!(rl.tokens(clock.now()), 0.5);

        mock.increment(Duration::from_millis(500));
        assert!(rl.try_consume(clock.now()));
    }

    #[test]
    fn denial_reports_time_to_next_token() {
        let (clock, mock) = Clock::mock();
        let rl = bucket(1.0, 4.0, &clock);
        assert!(rl.try_consume(clock.now()));

        mock.increment(Duration::from_millis(125));
        assert_eq!(
            rl.process(clock.now()),
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_millis(125)
            })
        );
    }

    #[test]
    fn it_never_exceeds_capacity_after_long_idle() {
        let (clock, mock) = Clock::mock();
        let rl = bucket(3.0, 1.0, &clock);
        assert!(rl.try_consume(clock.now()));

        mock.increment(Duration::from_secs(3600));
        assert_eq!(rl.tokens(clock.now()), 3.0);
        for _ in 0..3 {
            assert!(rl.try_consume(clock.now()));
        }
        assert!(!rl.try_consume(clock.now()));
    }

    #[test]
    fn test_clock_going_backwards_grants_nothing() {
        let (clock, mock) = Clock::mock();
        mock.increment(Duration::from_secs(10));
        let rl = bucket(3.0, 1.0, &clock);
        for _ in 0..3 {
            assert!(rl.try_consume(clock.now()));
        }

        mock.decrement(Duration::from_secs(1));
        assert!(!rl.try_consume(clock.now()));
        assert_eq!(rl.tokens(clock.now()), 0.0);

        // Back where we started: the second we "lost" is not credited again
        mock.increment(Duration::from_secs(1));
        assert!(!rl.try_consume(clock.now()));

        mock.increment(Duration::from_secs(1));
        assert!(rl.try_consume(clock.now()));
    }

    #[test]
    fn test_tokens_stay_in_bounds() {
        let (clock, mock) = Clock::mock();
        let rl = bucket(2.5, 0.75, &clock);

        // Deterministic mix of bursts and pauses of varying length
        for step in 0u64..500 {
            let advance = (step * 37) % 900;
            mock.increment(Duration::from_millis(advance));
            for _ in 0..(step % 4) {
                let _ = rl.process(clock.now());
                let level = rl.tokens(clock.now());
                assert_ge!(level, 0.0);
                assert_le!(level, 2.5);
            }
        }
    }

    #[test]
    fn test_idle_tracking() {
        let (clock, mock) = Clock::mock();
        let rl = bucket(3.0, 1.0, &clock);

        mock.increment(Duration::from_secs(5));
        assert_eq!(rl.idle_for(clock.now()), Duration::from_secs(5));

        let _ = rl.process(clock.now());
        assert_eq!(rl.idle_for(clock.now()), Duration::ZERO);

        mock.increment(Duration::from_secs(2));
        assert_eq!(rl.idle_for(clock.now()), Duration::from_secs(2));
    }

    #[test]
    fn test_actual_concurrency() {
        let (clock, _mock) = Clock::mock();
        let capacity = 100;
        let rl = Arc::new(bucket(capacity as f64, 1.0, &clock));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let rl = Arc::clone(&rl);
                let clock = clock.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..50).filter(|_| rl.try_consume(clock.now())).count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Time is frozen, so exactly the starting tokens get through
        assert_eq!(allowed, capacity);
    }
}
