use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Source of monotonic time for the batching timers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Debounce state for one project's review notifications.
///
/// The first recorded review starts a countdown of `delay`; each later
/// review pushes the deadline out to `now + delay` instead of stacking a
/// second countdown. All methods take the current instant so the timer is a
/// pure function of elapsed time.
#[derive(Debug, Clone)]
pub struct ReviewTimer {
    delay: Duration,
    deadline: Option<Instant>,
    last_review: Option<Instant>,
    /// Reviewed asset -> submitter email, since the last send
    reviewed: BTreeMap<Uuid, String>,
}

impl ReviewTimer {
    pub fn new(delay: Duration) -> Self {
        ReviewTimer {
            delay,
            deadline: None,
            last_review: None,
            reviewed: BTreeMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Note a reviewed asset and (re)start the countdown.
    pub fn record(&mut self, asset_id: Uuid, client_email: &str, now: Instant) {
        self.reviewed.insert(asset_id, client_email.to_string());
        self.last_review = Some(now);
        self.deadline = Some(now + self.delay);
    }

    /// Extend an active countdown to a full `delay` from now.
    pub fn reset(&mut self, now: Instant) {
        if self.is_active() {
            self.deadline = Some(now + self.delay);
        }
    }

    /// Cancel the countdown and forget pending reviews.
    pub fn stop(&mut self) {
        self.deadline = None;
        self.last_review = None;
        self.reviewed.clear();
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn last_review(&self) -> Option<Instant> {
        self.last_review
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Elapsed share of the countdown, 0.0 to 100.0.
    pub fn progress(&self, now: Instant) -> f64 {
        if !self.is_active() || self.delay.is_zero() {
            return 0.0;
        }
        let elapsed = self.delay.saturating_sub(self.remaining(now));
        (elapsed.as_secs_f64() / self.delay.as_secs_f64() * 100.0).clamp(0.0, 100.0)
    }

    /// Remaining time as `M:SS`, rounding partial seconds up.
    pub fn format_remaining(&self, now: Instant) -> String {
        let remaining = self.remaining(now);
        let mut secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs += 1;
        }
        format!("{}:{:02}", secs / 60, secs % 60)
    }

    /// Distinct submitter emails among pending reviews.
    pub fn emails(&self) -> BTreeSet<String> {
        self.reviewed.values().cloned().collect()
    }

    pub fn reviewed_count(&self) -> usize {
        self.reviewed.len()
    }

    /// Drop pending reviews for one client, stopping the timer when none
    /// remain. Returns how many were dropped.
    pub fn forget_client(&mut self, client_email: &str) -> usize {
        let before = self.reviewed.len();
        self.reviewed.retain(|_, email| email != client_email);
        if self.reviewed.is_empty() {
            self.stop();
        }
        before - self.reviewed.len()
    }

    /// Hand over the distinct emails and stop the timer.
    pub fn take_batch(&mut self) -> Vec<String> {
        let emails = self.emails().into_iter().collect();
        self.stop();
        emails
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Clock advanced by hand.
    pub struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            ManualClock {
                now: Mutex::new(Instant::now()),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    const FIVE_MIN: Duration = Duration::from_secs(300);

    #[test]
    fn first_review_starts_countdown() {
        let t0 = Instant::now();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        assert!(!timer.is_active());

        timer.record(Uuid::new_v4(), "a@example.com", t0);
        assert!(timer.is_active());
        assert_eq!(timer.remaining(t0), FIVE_MIN);
        assert_eq!(timer.format_remaining(t0), "5:00");
        assert!(!timer.is_expired(t0 + Duration::from_secs(299)));
        assert!(timer.is_expired(t0 + FIVE_MIN));
    }

    #[test]
    fn reset_before_expiry_moves_the_deadline() {
        let t0 = Instant::now();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.record(Uuid::new_v4(), "a@example.com", t0);

        let t1 = t0 + Duration::from_secs(120);
        timer.reset(t1);

        // must not fire at the original deadline
        assert!(!timer.is_expired(t0 + FIVE_MIN));
        assert!(!timer.is_expired(t1 + FIVE_MIN - Duration::from_millis(1)));
        assert!(timer.is_expired(t1 + FIVE_MIN));
    }

    #[test]
    fn later_reviews_extend_instead_of_stacking() {
        let t0 = Instant::now();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.record(Uuid::new_v4(), "a@example.com", t0);
        let t1 = t0 + Duration::from_secs(200);
        timer.record(Uuid::new_v4(), "b@example.com", t1);

        assert!(!timer.is_expired(t0 + FIVE_MIN));
        assert!(timer.is_expired(t1 + FIVE_MIN));
        assert_eq!(timer.last_review(), Some(t1));
        assert_eq!(timer.reviewed_count(), 2);
    }

    #[test]
    fn reset_on_idle_timer_is_a_no_op() {
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.reset(Instant::now());
        assert!(!timer.is_active());
    }

    #[test]
    fn take_batch_dedupes_emails_and_stops() {
        let t0 = Instant::now();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.record(Uuid::new_v4(), "b@example.com", t0);
        timer.record(Uuid::new_v4(), "a@example.com", t0);
        timer.record(Uuid::new_v4(), "b@example.com", t0);

        assert_eq!(timer.take_batch(), vec!["a@example.com", "b@example.com"]);
        assert!(!timer.is_active());
        assert_eq!(timer.reviewed_count(), 0);
        assert!(timer.take_batch().is_empty());
    }

    #[test]
    fn forgetting_a_client_keeps_the_others() {
        let t0 = Instant::now();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.record(Uuid::new_v4(), "a@example.com", t0);
        timer.record(Uuid::new_v4(), "a@example.com", t0);
        timer.record(Uuid::new_v4(), "b@example.com", t0);

        assert_eq!(timer.forget_client("a@example.com"), 2);
        assert!(timer.is_active());
        assert_eq!(timer.take_batch(), vec!["b@example.com"]);

        timer.record(Uuid::new_v4(), "c@example.com", t0);
        assert_eq!(timer.forget_client("c@example.com"), 1);
        assert!(!timer.is_active());
    }

    #[test]
    fn progress_and_remaining_format() {
        let t0 = Instant::now();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.record(Uuid::new_v4(), "a@example.com", t0);

        let later = t0 + Duration::from_millis(150_500);
        assert_eq!(timer.format_remaining(later), "2:30");
        let progress = timer.progress(t0 + Duration::from_secs(150));
        assert!((progress - 50.0).abs() < 1e-9);
        assert_eq!(timer.progress(t0 + Duration::from_secs(900)), 100.0);
    }

    #[test]
    fn manual_clock_drives_expiry() {
        let clock = ManualClock::new();
        let mut timer = ReviewTimer::new(FIVE_MIN);
        timer.record(Uuid::new_v4(), "a@example.com", clock.now());

        clock.advance(Duration::from_secs(299));
        assert!(!timer.is_expired(clock.now()));
        clock.advance(Duration::from_secs(1));
        assert!(timer.is_expired(clock.now()));
    }
}
