//! Start/stop rendezvous for the long-lived background tasks.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TaskCounts {
    started: usize,
    stopped: usize,
}

/// Tracks how many of a known number of background tasks have started and
/// how many have exited.
#[derive(Debug, Clone)]
pub struct TaskRendezvous {
    expected: usize,
    counts: Arc<watch::Sender<TaskCounts>>,
}

impl TaskRendezvous {
    pub fn new(expected: usize) -> Self {
        let (counts, _) = watch::channel(TaskCounts::default());
        Self {
            expected,
            counts: Arc::new(counts),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Handle given to one background task
    pub fn reporter(&self) -> TaskReporter {
        TaskReporter {
            counts: self.counts.clone(),
        }
    }

    pub fn started(&self) -> usize {
        self.counts.borrow().started
    }

    pub fn stopped(&self) -> usize {
        self.counts.borrow().stopped
    }

    /// Wait until every expected task reported that it started.
    pub async fn wait_started(&self) {
        let expected = self.expected;
        self.wait_until(|counts| counts.started >= expected).await;
    }

    /// Wait until every expected task exited.
    pub async fn wait_stopped(&self) {
        let expected = self.expected;
        self.wait_until(|counts| counts.stopped >= expected).await;
    }

    async fn wait_until(&self, done: impl Fn(&TaskCounts) -> bool) {
        let mut receiver = self.counts.subscribe();
        loop {
            if done(&*receiver.borrow_and_update()) {
                return;
            }
            // The sender lives as long as `self`, so this never errors.
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Reports one task's lifecycle to its `TaskRendezvous`
#[derive(Debug)]
pub struct TaskReporter {
    counts: Arc<watch::Sender<TaskCounts>>,
}

impl TaskReporter {
    /// Report the task as started. The task counts as stopped once the
    /// returned guard is dropped, including on panic.
    pub fn started(self) -> RunningTask {
        self.counts.send_modify(|counts| counts.started += 1);
        RunningTask {
            counts: self.counts,
        }
    }
}

#[derive(Debug)]
pub struct RunningTask {
    counts: Arc<watch::Sender<TaskCounts>>,
}

impl Drop for RunningTask {
    fn drop(&mut self) {
        self.counts.send_modify(|counts| counts.stopped += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_started_blocks_until_all_tasks_report() {
        let rendezvous = TaskRendezvous::new(2);
        let first = rendezvous.reporter().started();
        assert_eq!(rendezvous.started(), 1);

        let waiting = tokio::time::timeout(Duration::from_millis(20), rendezvous.wait_started()).await;
        assert!(waiting.is_err());

        let second = rendezvous.reporter();
        tokio::spawn(async move {
            let _running = second.started();
            tokio::time::sleep(Duration::from_millis(10)).await;
        });

        tokio::time::timeout(Duration::from_secs(1), rendezvous.wait_started())
            .await
            .expect("both tasks should have started");
        drop(first);
    }

    #[tokio::test]
    async fn test_wait_stopped_counts_dropped_guards() {
        let rendezvous = TaskRendezvous::new(2);
        let first = rendezvous.reporter().started();
        let second = rendezvous.reporter().started();

        drop(first);
        assert_eq!(rendezvous.stopped(), 1);

        let waiter = {
            let rendezvous = rendezvous.clone();
            tokio::spawn(async move { rendezvous.wait_stopped().await })
        };
        drop(second);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_stopped should return")
            .unwrap();
        assert_eq!(rendezvous.stopped(), 2);
    }
}
