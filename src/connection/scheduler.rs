//! Named, cancelable timers for the connection manager.
//!
//! Each timer runs as a small task that reports back over a channel. Arming
//! a task replaces (and aborts) any earlier timer of the same name, and the
//! id carried in each [`Fired`] lets the owner discard reports from timers
//! that were replaced or cancelled after they had already fired.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Heartbeat,
    ConnectTimeout,
    Reconnect,
    MetricsSample,
    BatchFlush,
    CoilCommit,
    AlertEcho,
}

impl Task {
    /// Timers tied to a live connection.
    pub const CONNECTION: &'static [Task] = &[
        Task::Heartbeat,
        Task::ConnectTimeout,
        Task::Reconnect,
        Task::MetricsSample,
    ];
}

/// A timer expiry report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub task: Task,
    id: u64,
}

#[derive(Debug)]
struct Armed {
    id: u64,
    handle: JoinHandle<()>,
    repeating: bool,
}

#[derive(Debug)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Fired>,
    tasks: HashMap<Task, Armed>,
    next_id: u64,
}

impl Scheduler {
    /// Create a scheduler and the receiver its timers report to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                tasks: HashMap::new(),
                next_id: 0,
            },
            rx,
        )
    }

    /// Fire `task` once after `delay`.
    pub fn once(&mut self, task: Task, delay: Duration) {
        let (id, tx) = self.prepare(task);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(Fired { task, id });
        });
        self.tasks.insert(task, Armed { id, handle, repeating: false });
    }

    /// Fire `task` every `period`, starting one period from now.
    pub fn every(&mut self, task: Task, period: Duration) {
        let (id, tx) = self.prepare(task);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Fired { task, id }).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(task, Armed { id, handle, repeating: true });
    }

    fn prepare(&mut self, task: Task) -> (u64, mpsc::UnboundedSender<Fired>) {
        self.cancel(task);
        self.next_id += 1;
        (self.next_id, self.tx.clone())
    }

    /// Whether a report belongs to the currently armed timer.
    ///
    /// One-shot timers are disarmed once accepted.
    pub fn accept(&mut self, fired: Fired) -> bool {
        let Some(armed) = self.tasks.get(&fired.task) else {
            return false;
        };
        if armed.id != fired.id {
            return false;
        }
        if !armed.repeating {
            self.tasks.remove(&fired.task);
        }
        true
    }

    pub fn is_armed(&self, task: Task) -> bool {
        self.tasks.contains_key(&task)
    }

    pub fn cancel(&mut self, task: Task) {
        if let Some(armed) = self.tasks.remove(&task) {
            armed.handle.abort();
        }
    }

    pub fn cancel_many(&mut self, tasks: &[Task]) {
        for task in tasks {
            self.cancel(*task);
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.tasks.drain() {
            armed.handle.abort();
        }
    }

    pub fn armed(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let (mut scheduler, mut rx) = Scheduler::new();
        scheduler.once(Task::Reconnect, Duration::from_secs(2));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.task, Task::Reconnect);
        assert!(scheduler.accept(fired));
        assert!(!scheduler.is_armed(Task::Reconnect));
        assert!(!scheduler.accept(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_discards_stale_report() {
        let (mut scheduler, mut rx) = Scheduler::new();
        scheduler.once(Task::ConnectTimeout, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Re-armed after the first timer already reported.
        scheduler.once(Task::ConnectTimeout, Duration::from_secs(60));
        let stale = rx.recv().await.unwrap();
        assert!(!scheduler.accept(stale));
        assert!(scheduler.is_armed(Task::ConnectTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_repeats_until_cancelled() {
        let (mut scheduler, mut rx) = Scheduler::new();
        scheduler.every(Task::Heartbeat, Duration::from_secs(1));

        for _ in 0..3 {
            let fired = rx.recv().await.unwrap();
            assert!(scheduler.accept(fired));
        }
        assert!(scheduler.is_armed(Task::Heartbeat));

        scheduler.cancel(Task::Heartbeat);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_leaves_nothing_running() {
        let (mut scheduler, mut rx) = Scheduler::new();
        scheduler.every(Task::Heartbeat, Duration::from_secs(1));
        scheduler.every(Task::MetricsSample, Duration::from_millis(100));
        scheduler.once(Task::Reconnect, Duration::from_secs(1));
        assert_eq!(scheduler.armed(), 3);

        scheduler.cancel_all();
        assert_eq!(scheduler.armed(), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
