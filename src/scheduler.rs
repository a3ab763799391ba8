//! Virtual-time task queue for the fixed delays the engine sequences with
//! the host: blur grace, work on the tick after a submit, and bounded
//! error-node retries.
//!
//! Time only moves when the owner advances it, which keeps every delay
//! deterministic under test.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use autofield::scheduler::Scheduler;
//!
//! let mut s = Scheduler::new();
//! let late = s.schedule(Duration::from_millis(150), "close");
//! s.schedule(Duration::ZERO, "focus");
//!
//! let until = s.now() + Duration::from_millis(10);
//! assert_eq!(s.pop_due(until).map(|(_, t)| t), Some("focus"));
//! assert_eq!(s.pop_due(until), None);
//! assert!(s.cancel(late));
//! assert_eq!(s.pending(), 0);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Tasks ordered by deadline, then by scheduling order.
#[derive(Debug)]
pub struct Scheduler<T> {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, TaskId), T>,
    deadlines: HashMap<TaskId, Duration>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// An empty queue at time zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule(&mut self, delay: Duration, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let due = self.now + delay;
        self.queue.insert((due, id), task);
        self.deadlines.insert(id, due);
        id
    }

    /// Drop a pending task. Returns whether it was still pending.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.deadlines.remove(&id) {
            Some(due) => self.queue.remove(&(due, id)).is_some(),
            None => false,
        }
    }

    /// Drop every pending task matching `pred`. Returns how many.
    pub fn cancel_where(&mut self, pred: impl Fn(&T) -> bool) -> usize {
        let doomed: Vec<(Duration, TaskId)> = self
            .queue
            .iter()
            .filter(|(_, task)| pred(task))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.queue.remove(key);
            self.deadlines.remove(&key.1);
        }
        doomed.len()
    }

    /// Take the earliest task due at or before `until`, moving the clock to
    /// its deadline.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TaskId, T)> {
        let (&(due, id), _) = self.queue.first_key_value()?;
        if due > until {
            return None;
        }
        let task = self.queue.remove(&(due, id))?;
        self.deadlines.remove(&id);
        self.now = self.now.max(due);
        Some((id, task))
    }

    /// Move the clock forward to `until` once every due task has run.
    pub fn settle_at(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Number of pending tasks.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deadline of the earliest pending task.
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule(30 * MS, 'c');
        s.schedule(10 * MS, 'a');
        s.schedule(10 * MS, 'b');
        let until = 100 * MS;
        let order: Vec<char> = std::iter::from_fn(|| s.pop_due(until).map(|(_, t)| t)).collect();
        assert_eq!(order, ['a', 'b', 'c']);
        assert_eq!(s.now(), 30 * MS);
        s.settle_at(until);
        assert_eq!(s.now(), until);
    }

    #[test]
    fn tasks_scheduled_while_draining_fire_when_due() {
        let mut s = Scheduler::new();
        s.schedule(32 * MS, 1);
        let until = 60 * MS;
        let mut fired = Vec::new();
        while let Some((_, n)) = s.pop_due(until) {
            fired.push(n);
            if n < 5 {
                s.schedule(25 * MS, n + 1);
            }
        }
        // 32ms, then 57ms; the third retry at 82ms is still pending.
        assert_eq!(fired, [1, 2]);
        assert_eq!(s.next_due(), Some(82 * MS));
    }

    #[test]
    fn cancel_where_filters_by_task() {
        let mut s = Scheduler::new();
        s.schedule(MS, ("close", 1));
        s.schedule(MS, ("close", 2));
        s.schedule(MS, ("focus", 1));
        assert_eq!(s.cancel_where(|(_, field)| *field == 1), 2);
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn cancelled_task_never_fires() {
        let mut s = Scheduler::new();
        let id = s.schedule(MS, ());
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        assert!(s.pop_due(10 * MS).is_none());
    }
}
