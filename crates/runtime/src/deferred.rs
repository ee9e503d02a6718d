/// Handle of a scheduled task, used for cancellation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug)]
struct Pending<T> {
    id: TaskId,
    due_ms: u64,
    payload: T,
}

/// Cancellable delayed work against a caller-driven millisecond clock.
///
/// Nothing runs by itself: the owner calls [`DeferredQueue::take_due`] with the
/// current time and executes what comes back. Ordering is `(due_ms, id)`, and
/// ids are handed out monotonically, so tasks due at the same instant run in
/// scheduling order.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    next_id: u64,
    tasks: Vec<Pending<T>>,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            tasks: Vec::new(),
        }
    }

    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, payload: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.tasks.push(Pending {
            id,
            due_ms: now_ms.saturating_add(delay_ms),
            payload,
        });
        id
    }

    /// Returns `true` if the task was still pending.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Drops every pending task and returns how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.tasks.len();
        self.tasks.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.tasks.iter().map(|t| t.due_ms).min()
    }

    /// Removes and returns every task with `due_ms <= now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<(TaskId, T)> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.tasks.len() {
            if self.tasks[i].due_ms <= now_ms {
                due.push(self.tasks.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.due_ms.cmp(&b.due_ms).then_with(|| a.id.cmp(&b.id)));
        due.into_iter().map(|t| (t.id, t.payload)).collect()
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
