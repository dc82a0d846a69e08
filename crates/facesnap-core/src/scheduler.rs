use std::collections::BTreeMap;
use std::time::Duration;

/// Handle to a scheduled one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Schedule/cancel capability the engine uses for its debounce timer.
///
/// The scheduler only decides *when* a timer is due. Delivering the fire
/// back to the engine (`AutoCapture::on_timer_fired`) is the owner's job, so
/// the fire always lands on the same event path as frames.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId;

    /// Cancel a timer. Cancelling an unknown, fired or already cancelled
    /// timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}

/// Virtual-time scheduler. Time only moves when [`ManualScheduler::advance`]
/// is called.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<TimerId, Duration>,
    scheduled_total: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward, returning every timer that came due, in
    /// deadline order. Returned timers are no longer pending.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        self.now += by;
        let now = self.now;

        let mut due: Vec<(Duration, TimerId)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();

        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of `schedule` calls over the scheduler's lifetime.
    pub fn scheduled_total(&self) -> usize {
        self.scheduled_total
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.scheduled_total += 1;
        self.pending.insert(id, self.now + delay);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.pending.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_fires_only_after_deadline() {
        let mut s = ManualScheduler::new();
        let id = s.schedule(300 * MS);

        assert!(s.advance(299 * MS).is_empty());
        assert!(s.is_pending(id));
        assert_eq!(s.advance(MS), vec![id]);
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn test_due_timers_in_deadline_order() {
        let mut s = ManualScheduler::new();
        let late = s.schedule(50 * MS);
        let early = s.schedule(10 * MS);
        assert_eq!(s.advance(100 * MS), vec![early, late]);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut s = ManualScheduler::new();
        let id = s.schedule(10 * MS);
        s.cancel(id);
        s.cancel(id);
        assert!(s.advance(Duration::from_secs(1)).is_empty());

        // Cancelling after fire is also a no-op.
        let id = s.schedule(10 * MS);
        assert_eq!(s.advance(10 * MS), vec![id]);
        s.cancel(id);
        s.cancel(TimerId(9999));
        assert_eq!(s.scheduled_total(), 2);
    }
}
