//! The scheduler interface (§5, §6): an abstract timer surface the engine
//! consumes for delayed/periodic work. The core defines only the trait;
//! combinators such as `debounce`/`throttle` are the actual consumers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// A cancellable handle to a scheduled unit of work.
#[derive(Clone)]
pub struct Task {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl Task {
    fn new() -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The abstract timer surface (§6). The core never schedules anything
/// itself; combinators hold a `Arc<dyn Scheduler>` and call into it.
pub trait Scheduler: Send + Sync {
    fn once(&self, delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Task;
    fn interval(&self, period: Duration, thunk: Box<dyn Fn() + Send + Sync>) -> Task;
    fn interval_with_initial_delay(
        &self,
        initial: Duration,
        period: Duration,
        thunk: Box<dyn Fn() + Send + Sync>,
    ) -> Task;
    fn cancel(&self, task: &Task);
    fn pending(&self, task: &Task) -> bool;
    fn cancel_all(&self);
}

/// A minimal `std::thread`-backed scheduler: each `once`/`interval` call
/// gets its own sleeping thread. Adequate for tests and small programs; a
/// production user is expected to supply a scheduler backed by a real
/// timer wheel (out of scope, §1).
#[derive(Default)]
pub struct ThreadScheduler {
    tasks: Mutex<Vec<Task>>,
}

impl ThreadScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn track(&self, task: Task) -> Task {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(task.clone());
        task
    }
}

impl Scheduler for ThreadScheduler {
    fn once(&self, delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Task {
        let task = self.track(Task::new());
        let cancelled = Arc::clone(&task.cancelled);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if !cancelled.load(Ordering::SeqCst) {
                thunk();
            }
        });
        task
    }

    fn interval(&self, period: Duration, thunk: Box<dyn Fn() + Send + Sync>) -> Task {
        self.interval_with_initial_delay(period, period, thunk)
    }

    fn interval_with_initial_delay(
        &self,
        initial: Duration,
        period: Duration,
        thunk: Box<dyn Fn() + Send + Sync>,
    ) -> Task {
        let task = self.track(Task::new());
        let cancelled = Arc::clone(&task.cancelled);
        std::thread::spawn(move || {
            std::thread::sleep(initial);
            loop {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                thunk();
                std::thread::sleep(period);
            }
        });
        task
    }

    fn cancel(&self, task: &Task) {
        task.cancelled.store(true, Ordering::SeqCst);
    }

    fn pending(&self, task: &Task) -> bool {
        !task.is_cancelled()
    }

    fn cancel_all(&self) {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.iter() {
            task.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::mpsc;

    #[test]
    fn once_runs_after_delay_unless_cancelled() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        let task = scheduler.once(Duration::from_millis(5), Box::new(move || {
            let _ = tx.send(());
        }));
        assert!(scheduler.pending(&task));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_ok());
    }

    #[test]
    fn cancel_prevents_firing() {
        let scheduler = ThreadScheduler::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let task = scheduler.once(Duration::from_millis(30), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        scheduler.cancel(&task);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
