//! FIFO waiting queue with per-user reassignment cooldowns. A user who just
//! reassigned away from a partner (or was disconnected/evicted) is
//! temporarily ineligible to be matched with *anyone*, so they don't get
//! immediately re-paired before they've had a moment to breathe.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

struct QueueState {
    order: VecDeque<String>,
    cooldowns: HashMap<String, DateTime<Utc>>,
}

pub struct WaitQueue {
    state: Mutex<QueueState>,
    cooldown_seconds: i64,
}

impl WaitQueue {
    pub fn new(cooldown_seconds: i64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                cooldowns: HashMap::new(),
            }),
            cooldown_seconds,
        }
    }

    /// Appends `user_id` to the back of the queue; returns its 1-based
    /// position at the moment of enqueue.
    pub async fn enqueue(&self, user_id: &str) -> usize {
        let mut state = self.state.lock().await;
        if !state.order.contains(&user_id.to_string()) {
            state.order.push_back(user_id.to_string());
        }
        state.order.iter().position(|u| u == user_id).unwrap_or(state.order.len() - 1) + 1
    }

    pub async fn remove(&self, user_id: &str) {
        let mut state = self.state.lock().await;
        state.order.retain(|u| u != user_id);
    }

    /// Starts a cooldown for `user_id`: while active, `dequeue_eligible_not`
    /// skips them against every candidate, not just their last partner.
    pub async fn set_cooldown(&self, user_id: &str) {
        let mut state = self.state.lock().await;
        state.cooldowns.insert(
            user_id.to_string(),
            Utc::now() + chrono::Duration::seconds(self.cooldown_seconds),
        );
    }

    /// Lifts a user's cooldown early, if any.
    pub async fn clear_cooldown(&self, user_id: &str) {
        let mut state = self.state.lock().await;
        state.cooldowns.remove(user_id);
    }

    /// Seconds remaining in `user_id`'s cooldown, or `None` if they aren't
    /// under one (or it has already expired).
    pub async fn remaining(&self, user_id: &str) -> Option<i64> {
        let state = self.state.lock().await;
        let until = *state.cooldowns.get(user_id)?;
        let secs = (until - Utc::now()).num_seconds();
        (secs > 0).then_some(secs)
    }

    fn cooldown_blocks(cooldowns: &HashMap<String, DateTime<Utc>>, user_id: &str) -> bool {
        match cooldowns.get(user_id) {
            Some(until) => *until > Utc::now(),
            None => false,
        }
    }

    /// Pops the first queued user that isn't `exclude` and isn't under
    /// cooldown, preserving the relative order of everyone skipped over
    /// (they go back to the front, in original order, so a cooldown never
    /// causes starvation or reordering of unrelated waiters).
    pub async fn dequeue_eligible_not(&self, exclude: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(candidate) = state.order.pop_front() {
            if candidate == exclude {
                skipped.push(candidate);
                continue;
            }
            if Self::cooldown_blocks(&state.cooldowns, &candidate) {
                skipped.push(candidate);
                continue;
            }
            found = Some(candidate);
            break;
        }
        for user in skipped.into_iter().rev() {
            state.order.push_front(user);
        }
        found
    }

    /// Returns a single waiting user with no eligibility restriction, for
    /// AI-fallback pairing when the queue has an odd one left over.
    pub async fn odd_eligible_user(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.order.front().cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.order.len()
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.state.lock().await.order.iter().any(|u| u == user_id)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_reports_one_based_position() {
        let queue = WaitQueue::new(10);
        assert_eq!(queue.enqueue("a").await, 1);
        assert_eq!(queue.enqueue("b").await, 2);
    }

    #[tokio::test]
    async fn dequeue_skips_excluded_and_preserves_order_of_others() {
        let queue = WaitQueue::new(10);
        queue.enqueue("a").await;
        queue.enqueue("b").await;
        queue.enqueue("c").await;

        let next = queue.dequeue_eligible_not("a").await;
        assert_eq!(next.as_deref(), Some("b"));

        // "a" must still be queued (skipped, not removed), ahead of "c".
        let remaining = queue.dequeue_eligible_not("zzz").await;
        assert_eq!(remaining.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn cooldown_blocks_a_user_against_any_candidate() {
        let queue = WaitQueue::new(60);
        queue.enqueue("a").await;
        queue.set_cooldown("a").await;

        // "a" is under cooldown, so it's skipped regardless of who excludes.
        assert_eq!(queue.dequeue_eligible_not("b").await, None);
        assert_eq!(queue.dequeue_eligible_not("c").await, None);

        queue.clear_cooldown("a").await;
        let next = queue.dequeue_eligible_not("c").await;
        assert_eq!(next.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn remaining_reports_none_once_cleared_or_expired() {
        let queue = WaitQueue::new(60);
        queue.set_cooldown("a").await;
        assert!(queue.remaining("a").await.is_some());

        queue.clear_cooldown("a").await;
        assert_eq!(queue.remaining("a").await, None);
        assert_eq!(queue.remaining("nobody").await, None);
    }

    #[tokio::test]
    async fn remove_takes_user_out_of_the_queue() {
        let queue = WaitQueue::new(10);
        queue.enqueue("a").await;
        queue.remove("a").await;
        assert!(queue.is_empty().await);
    }
}
