//! The queue's mutable core, kept behind a single lock.

use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    DeadLetter, QueueItem, QueueItemId, RetryPolicy, WindowKind, rate_limiter::RateLimiter,
};

/// What the worker should do next.
#[derive(Debug)]
pub(super) enum Step {
    /// Nothing pending.
    Idle,
    /// A rate window is full; wait for it to roll.
    Saturated { window: WindowKind, wait: Duration },
    /// Only future-scheduled items remain.
    Waiting { wait: Duration },
    /// Send this item. It has already been removed from `pending`.
    Dispatch(QueueItem),
}

#[derive(Debug)]
pub(super) struct QueueState {
    pub(super) pending: VecDeque<QueueItem>,
    pub(super) limiter: RateLimiter,
    pub(super) retry: RetryPolicy,
    pub(super) is_processing: bool,
    pub(super) in_flight: Option<QueueItemId>,
    pub(super) dead_letters: VecDeque<DeadLetter>,
    pub(super) dead_letter_capacity: usize,
}

impl QueueState {
    /// Place a new item behind every item of the same or higher priority.
    pub(super) fn insert(&mut self, item: QueueItem) {
        let position = self
            .pending
            .iter()
            .position(|queued| queued.priority() > item.priority());

        match position {
            Some(index) => self.pending.insert(index, item),
            None => self.pending.push_back(item),
        }
    }

    /// Re-queue a retried item ahead of everything else.
    pub(super) fn push_front(&mut self, item: QueueItem) {
        self.pending.push_front(item);
    }

    pub(super) fn cancel(&mut self, id: QueueItemId) -> bool {
        let Some(index) = self.pending.iter().position(|item| item.id() == id) else {
            return false;
        };

        self.pending.remove(index);
        true
    }

    pub(super) fn dead_letter(&mut self, letter: DeadLetter) {
        if self.dead_letter_capacity == 0 {
            return;
        }

        while self.dead_letters.len() >= self.dead_letter_capacity {
            self.dead_letters.pop_front();
        }
        self.dead_letters.push_back(letter);
    }

    /// Decide the next step, removing the chosen item if there is one.
    pub(super) fn next_step(&mut self, now: DateTime<Utc>) -> Step {
        if self.pending.is_empty() {
            self.is_processing = self.in_flight.is_some();
            return Step::Idle;
        }

        self.is_processing = true;

        if let Err((window, wait)) = self.limiter.check(now) {
            return Step::Saturated { window, wait };
        }

        if let Some(index) = self.pending.iter().position(|item| item.is_due(now))
            && let Some(item) = self.pending.remove(index)
        {
            self.in_flight = Some(item.id());
            return Step::Dispatch(item);
        }

        let wait = self
            .pending
            .iter()
            .filter_map(QueueItem::scheduled_for)
            .min()
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO);

        Step::Waiting { wait }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use courier_common::{EmailType, RecipientHasher};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{EnqueueOptions, OutgoingEmail, Priority, RateLimits};

    fn state(now: DateTime<Utc>) -> QueueState {
        QueueState {
            pending: VecDeque::new(),
            limiter: RateLimiter::new(RateLimits::default(), now),
            retry: RetryPolicy::default(),
            is_processing: false,
            in_flight: None,
            dead_letters: VecDeque::new(),
            dead_letter_capacity: 2,
        }
    }

    fn item(priority: Priority, now: DateTime<Utc>) -> QueueItem {
        let email = OutgoingEmail::new("a@example.com", "s", "t", EmailType::Notification);
        let hash = RecipientHasher::default().hash(&email.to);
        QueueItem::new(email, hash, EnqueueOptions::priority(priority), now)
    }

    fn priorities(state: &QueueState) -> Vec<Priority> {
        state.pending.iter().map(QueueItem::priority).collect()
    }

    #[test]
    fn test_three_tier_insertion() {
        let now = Utc::now();
        let mut state = state(now);

        for priority in [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Normal,
            Priority::High,
            Priority::Low,
        ] {
            state.insert(item(priority, now));
        }

        assert_eq!(
            priorities(&state),
            vec![
                Priority::High,
                Priority::High,
                Priority::Normal,
                Priority::Normal,
                Priority::Low,
                Priority::Low,
            ]
        );
    }

    #[test]
    fn test_fifo_within_tier() {
        let now = Utc::now();
        let mut state = state(now);
        let first = item(Priority::Normal, now);
        let second = item(Priority::Normal, now);
        let (first_id, second_id) = (first.id(), second.id());

        state.insert(first);
        state.insert(second);

        let ids: Vec<_> = state.pending.iter().map(QueueItem::id).collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }

    #[test]
    fn test_retry_jumps_whole_queue() {
        let now = Utc::now();
        let mut state = state(now);
        state.insert(item(Priority::High, now));

        let retried = item(Priority::Low, now).attempted(now);
        let retried_id = retried.id();
        state.push_front(retried);

        let Step::Dispatch(next) = state.next_step(now) else {
            panic!("expected a dispatch");
        };
        assert_eq!(next.id(), retried_id);
        assert_eq!(state.in_flight, Some(retried_id));
    }

    #[test]
    fn test_skips_future_items() {
        let now = Utc::now();
        let mut state = state(now);
        let email = OutgoingEmail::new("a@example.com", "s", "t", EmailType::Invite);
        let hash = RecipientHasher::default().hash(&email.to);
        state.insert(QueueItem::new(
            email,
            hash,
            EnqueueOptions::priority(Priority::High).scheduled_for(now + TimeDelta::seconds(30)),
            now,
        ));

        assert!(matches!(
            state.next_step(now),
            Step::Waiting { wait } if wait == Duration::from_secs(30)
        ));

        let due = item(Priority::Low, now);
        let due_id = due.id();
        state.insert(due);

        let Step::Dispatch(next) = state.next_step(now) else {
            panic!("expected a dispatch");
        };
        assert_eq!(next.id(), due_id);
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let now = Utc::now();
        let mut state = state(now);
        let queued = item(Priority::Normal, now);
        let id = queued.id();
        state.insert(queued);

        assert!(state.cancel(id));
        assert!(!state.cancel(id));
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_idle_clears_processing() {
        let now = Utc::now();
        let mut state = state(now);
        state.is_processing = true;

        assert!(matches!(state.next_step(now), Step::Idle));
        assert!(!state.is_processing);
    }

    #[test]
    fn test_dead_letter_ring_is_bounded() {
        let now = Utc::now();
        let mut state = state(now);

        for _ in 0..3 {
            state.dead_letter(DeadLetter {
                item: item(Priority::Normal, now),
                last_error: "refused".to_string(),
                failed_at: now,
            });
        }

        assert_eq!(state.dead_letters.len(), 2);
    }
}
