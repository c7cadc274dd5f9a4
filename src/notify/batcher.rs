use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::notify::delivery;
use crate::notify::timer::{Clock, ReviewTimer, SystemClock};
use crate::state::AppState;

const TICK: Duration = Duration::from_secs(1);

/// Point-in-time view of one project's pending batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSnapshot {
    pub active: bool,
    pub remaining: Duration,
    pub remaining_label: String,
    pub progress: f64,
    pub reviewed_count: usize,
    pub emails: Vec<String>,
}

/// Outcome of sending one batch, one email per client.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Review-notification timers keyed by project.
#[derive(Clone)]
pub struct NotificationBatcher {
    timers: Arc<Mutex<HashMap<Uuid, ReviewTimer>>>,
    delay: Duration,
    clock: Arc<dyn Clock>,
}

impl NotificationBatcher {
    pub fn new(delay: Duration) -> Self {
        Self::with_clock(delay, Arc::new(SystemClock))
    }

    pub fn with_clock(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        NotificationBatcher {
            timers: Arc::new(Mutex::new(HashMap::new())),
            delay,
            clock,
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Uuid, ReviewTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a reviewed asset to the project's batch, starting or extending
    /// its countdown.
    pub fn register(&self, project_id: Uuid, asset_id: Uuid, client_email: &str) {
        let now = self.clock.now();
        let delay = self.delay;
        let mut timers = self.timers();
        let timer = timers
            .entry(project_id)
            .or_insert_with(|| ReviewTimer::new(delay));
        timer.record(asset_id, client_email, now);
        debug!(project_id = %project_id, asset_id = %asset_id, pending = timer.reviewed_count(), "Review queued for notification");
    }

    pub fn snapshot(&self, project_id: Uuid) -> BatchSnapshot {
        let now = self.clock.now();
        let timers = self.timers();
        match timers.get(&project_id) {
            Some(timer) => BatchSnapshot {
                active: timer.is_active(),
                remaining: timer.remaining(now),
                remaining_label: timer.format_remaining(now),
                progress: timer.progress(now),
                reviewed_count: timer.reviewed_count(),
                emails: timer.emails().into_iter().collect(),
            },
            None => BatchSnapshot {
                active: false,
                remaining: Duration::ZERO,
                remaining_label: "0:00".to_string(),
                progress: 0.0,
                reviewed_count: 0,
                emails: Vec::new(),
            },
        }
    }

    /// Extend the project's countdown; false when no batch is pending.
    pub fn reset(&self, project_id: Uuid) -> bool {
        let now = self.clock.now();
        match self.timers().get_mut(&project_id) {
            Some(timer) if timer.is_active() => {
                timer.reset(now);
                true
            }
            _ => false,
        }
    }

    /// Drop the project's pending batch without sending.
    pub fn stop(&self, project_id: Uuid) -> bool {
        self.timers()
            .remove(&project_id)
            .is_some_and(|timer| timer.is_active())
    }

    /// Batches whose countdown has run out, removed from the batcher.
    pub fn take_due(&self) -> Vec<(Uuid, Vec<String>)> {
        let now = self.clock.now();
        let mut timers = self.timers();
        let due: Vec<Uuid> = timers
            .iter()
            .filter(|(_, timer)| timer.is_expired(now))
            .map(|(id, _)| *id)
            .collect();

        due.into_iter()
            .filter_map(|id| timers.remove(&id).map(|mut timer| (id, timer.take_batch())))
            .collect()
    }

    /// Remove one client from the project's pending batch, e.g. after they
    /// were notified by hand. An emptied batch is dropped.
    pub fn forget_client(&self, project_id: Uuid, client_email: &str) -> usize {
        let mut timers = self.timers();
        let Some(timer) = timers.get_mut(&project_id) else {
            return 0;
        };
        let dropped = timer.forget_client(client_email);
        if !timer.is_active() {
            timers.remove(&project_id);
        }
        dropped
    }

    /// Take the project's batch immediately, regardless of the countdown.
    pub fn take_now(&self, project_id: Uuid) -> Vec<String> {
        self.timers()
            .remove(&project_id)
            .map(|mut timer| timer.take_batch())
            .unwrap_or_default()
    }
}

/// Send one notification per client email, sequentially. Failures are
/// tallied, never retried.
pub async fn dispatch(state: &AppState, project_id: Uuid, emails: &[String]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for email in emails {
        match delivery::send_review_notification(state, project_id, email).await {
            Ok(outcome) => {
                report.sent += 1;
                debug!(project_id = %project_id, email = %email, email_id = ?outcome.email_id, "Notification sent");
            }
            Err(err) => {
                report.failed += 1;
                warn!(project_id = %project_id, email = %email, error = %err, "Notification failed");
                report.errors.push(format!("{email}: {err}"));
            }
        }
    }

    info!(
        project_id = %project_id,
        sent = report.sent,
        failed = report.failed,
        "Review notification batch dispatched"
    );
    report
}

/// Background ticker that sends batches whose countdown has expired.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for (project_id, emails) in state.batcher.take_due() {
                if emails.is_empty() {
                    continue;
                }
                dispatch(&state, project_id, &emails).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::timer::tests::ManualClock;

    const DELAY: Duration = Duration::from_secs(300);

    fn batcher() -> (NotificationBatcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (NotificationBatcher::with_clock(DELAY, clock.clone()), clock)
    }

    #[test]
    fn batch_is_due_only_after_the_extended_deadline() {
        let (batcher, clock) = batcher();
        let project = Uuid::new_v4();

        batcher.register(project, Uuid::new_v4(), "a@example.com");
        clock.advance(Duration::from_secs(200));
        batcher.register(project, Uuid::new_v4(), "b@example.com");

        clock.advance(Duration::from_secs(100));
        assert!(batcher.take_due().is_empty());

        clock.advance(Duration::from_secs(200));
        let due = batcher.take_due();
        assert_eq!(due, vec![(project, vec!["a@example.com".to_string(), "b@example.com".to_string()])]);
        assert!(!batcher.snapshot(project).active);
    }

    #[test]
    fn projects_are_batched_independently() {
        let (batcher, clock) = batcher();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        batcher.register(first, Uuid::new_v4(), "a@example.com");
        clock.advance(Duration::from_secs(120));
        batcher.register(second, Uuid::new_v4(), "b@example.com");

        clock.advance(Duration::from_secs(180));
        let due = batcher.take_due();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, first);
        assert!(batcher.snapshot(second).active);
    }

    #[test]
    fn notified_client_leaves_the_batch() {
        let (batcher, clock) = batcher();
        let project = Uuid::new_v4();
        batcher.register(project, Uuid::new_v4(), "a@example.com");
        batcher.register(project, Uuid::new_v4(), "b@example.com");

        assert_eq!(batcher.forget_client(project, "a@example.com"), 1);
        assert_eq!(batcher.forget_client(Uuid::new_v4(), "a@example.com"), 0);

        clock.advance(DELAY);
        assert_eq!(batcher.take_due(), vec![(project, vec!["b@example.com".to_string()])]);
    }

    #[test]
    fn forgetting_the_last_client_ends_the_batch() {
        let (batcher, clock) = batcher();
        let project = Uuid::new_v4();
        batcher.register(project, Uuid::new_v4(), "a@example.com");

        batcher.forget_client(project, "a@example.com");
        assert!(!batcher.snapshot(project).active);
        clock.advance(DELAY);
        assert!(batcher.take_due().is_empty());
    }

    #[test]
    fn reset_and_stop() {
        let (batcher, clock) = batcher();
        let project = Uuid::new_v4();
        assert!(!batcher.reset(project));

        batcher.register(project, Uuid::new_v4(), "a@example.com");
        clock.advance(Duration::from_secs(290));
        assert!(batcher.reset(project));
        assert_eq!(batcher.snapshot(project).remaining_label, "5:00");

        assert!(batcher.stop(project));
        assert!(!batcher.stop(project));
        assert!(batcher.take_now(project).is_empty());
    }

    #[test]
    fn take_now_ignores_the_countdown() {
        let (batcher, _clock) = batcher();
        let project = Uuid::new_v4();
        batcher.register(project, Uuid::new_v4(), "a@example.com");

        let snapshot = batcher.snapshot(project);
        assert_eq!(snapshot.reviewed_count, 1);
        assert_eq!(snapshot.emails, vec!["a@example.com"]);

        assert_eq!(batcher.take_now(project), vec!["a@example.com"]);
        assert!(batcher.take_due().is_empty());
    }
}
