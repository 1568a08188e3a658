//! Background task scheduling over text snapshots.
//!
//! Jobs run on their own worker threads and only ever see an immutable [`TextSnapshot`].
//! Results come back through an `mpsc` channel that the editing thread drains once per UI tick
//! with [`AnalysisScheduler::drain`]; results computed for an older document generation, and
//! results of tasks superseded by a newer submission under the same key, are dropped there.
//! Nothing a worker does can reach the document.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use folio_core::TextSnapshot;

use crate::error::AnalysisError;

/// Cooperative cancellation flag shared between the scheduler and a job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the job to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` if the token fired. Jobs call this between units of work.
    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

/// A finished task.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult<T> {
    /// The task.
    pub task: TaskId,
    /// Key the task was submitted under.
    pub key: String,
    /// Generation of the snapshot the task analyzed.
    pub generation: u64,
    /// What the job returned.
    pub outcome: Result<T, AnalysisError>,
}

struct ActiveTask {
    task: TaskId,
    token: CancellationToken,
}

/// Runs analysis jobs off the editing thread and hands back fresh results.
pub struct AnalysisScheduler<T> {
    tx: mpsc::Sender<AnalysisResult<T>>,
    rx: mpsc::Receiver<AnalysisResult<T>>,
    active: HashMap<String, ActiveTask>,
    next_task: u64,
}

impl<T> std::fmt::Debug for AnalysisScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisScheduler")
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .field("next_task", &self.next_task)
            .finish()
    }
}

impl<T: Send + 'static> Default for AnalysisScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> AnalysisScheduler<T> {
    /// A scheduler with no running tasks.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            active: HashMap::new(),
            next_task: 1,
        }
    }

    /// Run `job` over `snapshot` on a worker thread. A task already running under `key` is
    /// cancelled and its result will be dropped.
    pub fn submit<F>(&mut self, key: impl Into<String>, snapshot: TextSnapshot, job: F) -> TaskId
    where
        F: FnOnce(&TextSnapshot, &CancellationToken) -> Result<T, AnalysisError> + Send + 'static,
    {
        let key = key.into();
        let task = TaskId(self.next_task);
        self.next_task += 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.active.insert(
            key.clone(),
            ActiveTask {
                task,
                token: token.clone(),
            },
        ) {
            log::debug!("task {:?} under {key:?} superseded by {task:?}", previous.task);
            previous.token.cancel();
        }

        let tx = self.tx.clone();
        let generation = snapshot.generation();
        let thread_key = key.clone();
        let spawned = thread::Builder::new()
            .name(format!("folio-analysis-{key}"))
            .spawn(move || {
                let outcome = token.check().and_then(|()| job(&snapshot, &token));
                let outcome = match outcome {
                    Ok(_) if token.is_cancelled() => Err(AnalysisError::Cancelled),
                    other => other,
                };
                // The scheduler may be gone; then nobody wants the result.
                let _ = tx.send(AnalysisResult {
                    task,
                    key: thread_key,
                    generation,
                    outcome,
                });
            });
        if let Err(err) = spawned {
            log::warn!("could not start analysis worker for {key:?}: {err}");
            self.active.remove(&key);
            let _ = self.tx.send(AnalysisResult {
                task,
                key: key.clone(),
                generation,
                outcome: Err(AnalysisError::unavailable(&key, err.to_string())),
            });
        }
        task
    }

    /// Cancel the task running under `key`.
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.active.remove(key) {
            Some(active) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running task.
    pub fn cancel_all(&mut self) {
        for (_, active) in self.active.drain() {
            active.token.cancel();
        }
    }

    /// Number of tasks whose results have not been drained yet.
    pub fn pending(&self) -> usize {
        self.active.len()
    }

    /// Returns `true` if a task is running under `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.active.contains_key(key)
    }

    /// Collect finished results without blocking. Only results for `current_generation` from
    /// tasks that were neither superseded nor cancelled are returned.
    pub fn drain(&mut self, current_generation: u64) -> Vec<AnalysisResult<T>> {
        let mut out = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            if let Some(result) = self.accept(result, current_generation) {
                out.push(result);
            }
        }
        out
    }

    /// Like [`drain`](Self::drain), but wait up to `timeout` for the pending tasks to finish.
    pub fn drain_until_idle(&mut self, current_generation: u64, timeout: Duration) -> Vec<AnalysisResult<T>> {
        let deadline = Instant::now() + timeout;
        let mut out = self.drain(current_generation);
        while !self.active.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(result) => out.extend(self.accept(result, current_generation)),
                Err(_) => break,
            }
        }
        out
    }

    fn accept(&mut self, result: AnalysisResult<T>, current_generation: u64) -> Option<AnalysisResult<T>> {
        let current_task = self.active.get(&result.key).map(|a| a.task);
        if current_task != Some(result.task) {
            log::debug!("dropping result of superseded task {:?} ({})", result.task, result.key);
            return None;
        }
        self.active.remove(&result.key);
        if matches!(result.outcome, Err(AnalysisError::Cancelled)) {
            log::debug!("task {:?} ({}) was cancelled", result.task, result.key);
            return None;
        }
        if result.generation != current_generation {
            log::debug!(
                "dropping stale {} result: generation {} != {}",
                result.key,
                result.generation,
                current_generation
            );
            return None;
        }
        Some(result)
    }
}

impl<T> Drop for AnalysisScheduler<T> {
    fn drop(&mut self) {
        for active in self.active.values() {
            active.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Document;

    const WAIT: Duration = Duration::from_secs(10);

    fn snapshot(text: &str) -> TextSnapshot {
        Document::from_plain_text(text).snapshot()
    }

    #[test]
    fn test_results_arrive_for_current_generation() {
        let mut scheduler = AnalysisScheduler::new();
        let snap = snapshot("three little words");
        let generation = snap.generation();
        let task = scheduler.submit("count", snap, |s, _| Ok(s.text().split_whitespace().count()));
        let results = scheduler.drain_until_idle(generation, WAIT);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task, task);
        assert_eq!(results[0].outcome, Ok(3));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_stale_results_are_dropped() {
        let mut scheduler = AnalysisScheduler::new();
        let snap = snapshot("text");
        let generation = snap.generation();
        scheduler.submit("len", snap, |s, _| Ok(s.len_chars()));
        assert!(scheduler.drain_until_idle(generation + 1, WAIT).is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_newer_submission_cancels_older() {
        let mut scheduler = AnalysisScheduler::new();
        let snap = snapshot("text");
        let generation = snap.generation();
        let first = scheduler.submit("job", snap.clone(), |_, token| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            token.check().map(|()| "first")
        });
        let second = scheduler.submit("job", snap, |_, _| Ok("second"));
        assert_ne!(first, second);
        let results = scheduler.drain_until_idle(generation, WAIT);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, Ok("second"));
    }

    #[test]
    fn test_cancel_drops_result() {
        let mut scheduler: AnalysisScheduler<()> = AnalysisScheduler::new();
        let snap = snapshot("text");
        let generation = snap.generation();
        scheduler.submit("slow", snap, |_, token| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Err(AnalysisError::Cancelled)
        });
        assert!(scheduler.is_pending("slow"));
        assert!(scheduler.cancel("slow"));
        assert!(!scheduler.cancel("slow"));
        assert!(scheduler.drain_until_idle(generation, Duration::from_millis(50)).is_empty());
    }
}
