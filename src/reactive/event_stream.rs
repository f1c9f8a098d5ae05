use super::Reactive;
use crate::error::NetworkError;
use crate::value::{Clock, Occurrence, Rvt, Timestamp, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Default bound on an [`EventStream`]'s queue (§4.1).
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

struct State {
    queue: VecDeque<(Value, Timestamp)>,
    last_occ: Option<Rvt>,
    completed: bool,
}

/// A discrete reactive backed by a bounded FIFO queue. Values are available
/// only while queued; `consume` pops the head into `last_occ`.
pub struct EventStream {
    label: String,
    clock: Arc<Clock>,
    max_queue_size: usize,
    state: Mutex<State>,
}

impl EventStream {
    pub fn new(label: impl Into<String>, clock: Arc<Clock>) -> Arc<Self> {
        Self::with_capacity(label, clock, DEFAULT_MAX_QUEUE_SIZE)
    }

    pub fn with_capacity(
        label: impl Into<String>,
        clock: Arc<Clock>,
        max_queue_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            clock,
            max_queue_size,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                last_occ: None,
                completed: false,
            }),
        })
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).queue.len()
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("EventStream")
            .field("label", &self.label)
            .field("queued", &state.queue.len())
            .field("completed", &state.completed)
            .finish()
    }
}

impl Reactive for EventStream {
    fn next_value(&self) -> Option<Rvt> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queue.front().cloned()
    }

    fn available(&self) -> bool {
        !self.state.lock().unwrap_or_else(|e| e.into_inner()).queue.is_empty()
    }

    fn pending(&self) -> bool {
        self.available()
    }

    fn completed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).completed
    }

    fn consume(&self) -> Option<Rvt> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let rvt = state.queue.pop_front()?;
        state.last_occ = Some(rvt.clone());
        Some(rvt)
    }

    fn deliver(&self, occ: Occurrence) -> Result<bool, NetworkError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.completed && !occ.is_completed() {
            return Err(NetworkError::Completed);
        }
        match occ {
            Occurrence::Completed => {
                // Leaves the queue intact: pending values still drain
                // before the stream is treated as dead (§4.3 liveness).
                // Idempotent: delivering COMPLETED again is a no-op, not
                // an error (§7).
                state.completed = true;
                Ok(true)
            }
            Occurrence::Value(v) => {
                if state.queue.len() >= self.max_queue_size {
                    return Err(NetworkError::QueueOverflow {
                        capacity: self.max_queue_size,
                    });
                }
                let ts = self.clock.tick();
                state.queue.push_back((v, ts));
                Ok(true)
            }
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let clock = Arc::new(Clock::new());
        let s = EventStream::new("s", clock);
        s.deliver(Occurrence::value(1i32)).unwrap();
        s.deliver(Occurrence::value(2i32)).unwrap();
        let (v, _) = s.consume().unwrap();
        assert_eq!(*v.downcast_ref::<i32>().unwrap(), 1);
        let (v, _) = s.consume().unwrap();
        assert_eq!(*v.downcast_ref::<i32>().unwrap(), 2);
        assert!(s.consume().is_none());
    }

    #[test]
    fn overflow_is_reported() {
        let clock = Arc::new(Clock::new());
        let s = EventStream::with_capacity("s", clock, 1);
        s.deliver(Occurrence::value(1i32)).unwrap();
        assert!(matches!(
            s.deliver(Occurrence::value(2i32)),
            Err(NetworkError::QueueOverflow { capacity: 1 })
        ));
    }

    #[test]
    fn completed_stream_rejects_further_values() {
        let clock = Arc::new(Clock::new());
        let s = EventStream::new("s", clock);
        s.deliver(Occurrence::Completed).unwrap();
        assert!(matches!(
            s.deliver(Occurrence::value(1i32)),
            Err(NetworkError::Completed)
        ));
        // COMPLETED itself is idempotent.
        assert!(s.deliver(Occurrence::Completed).is_ok());
    }
}
