use super::Reactive;
use crate::error::NetworkError;
use crate::value::{Clock, Occurrence, Rvt, Timestamp, Value};
use std::fmt;
use std::iter::Peekable;
use std::sync::{Arc, Mutex};

/// A read-only reactive backed by a lazy (finite or infinite) sequence.
/// Reuses the event-stream interface so pre-built sequences can feed the
/// network as sources; external `deliver` is unsupported.
pub struct SeqStream {
    label: String,
    clock: Arc<Clock>,
    inner: Mutex<Inner>,
}

struct Inner {
    iter: Peekable<Box<dyn Iterator<Item = Value> + Send>>,
    /// Cached timestamp for the current (not-yet-consumed) head, assigned
    /// the first time it is peeked so repeated peeks are stable.
    head_ts: Option<Timestamp>,
    completed: bool,
}

impl SeqStream {
    pub fn new<I>(label: impl Into<String>, clock: Arc<Clock>, values: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        let boxed: Box<dyn Iterator<Item = Value> + Send> = Box::new(values.into_iter());
        Arc::new(Self {
            label: label.into(),
            clock,
            inner: Mutex::new(Inner {
                iter: boxed.peekable(),
                head_ts: None,
                completed: false,
            }),
        })
    }
}

impl fmt::Debug for SeqStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqStream").field("label", &self.label).finish()
    }
}

impl Reactive for SeqStream {
    fn next_value(&self) -> Option<Rvt> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let v = inner.iter.peek()?.clone();
        let ts = match inner.head_ts {
            Some(ts) => ts,
            None => {
                let ts = self.clock.tick();
                inner.head_ts = Some(ts);
                ts
            }
        };
        Some((v, ts))
    }

    fn available(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.iter.peek().is_some()
    }

    fn pending(&self) -> bool {
        self.available()
    }

    fn completed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).completed
    }

    fn consume(&self) -> Option<Rvt> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let v = inner.iter.next()?;
        let ts = inner.head_ts.take().unwrap_or_else(|| self.clock.tick());
        if inner.iter.peek().is_none() {
            inner.completed = true;
        }
        Some((v, ts))
    }

    fn deliver(&self, _occ: Occurrence) -> Result<bool, NetworkError> {
        Err(NetworkError::Unsupported)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_order_then_completes() {
        let clock = Arc::new(Clock::new());
        let values: Vec<Value> = vec![Arc::new(1i32), Arc::new(2i32)];
        let s = SeqStream::new("s", clock, values);
        assert!(s.available());
        let (v, _) = s.consume().unwrap();
        assert_eq!(*v.downcast_ref::<i32>().unwrap(), 1);
        assert!(!s.completed());
        let (v, _) = s.consume().unwrap();
        assert_eq!(*v.downcast_ref::<i32>().unwrap(), 2);
        assert!(s.completed());
    }

    #[test]
    fn deliver_is_unsupported() {
        let clock = Arc::new(Clock::new());
        let s = SeqStream::new("s", clock, Vec::<Value>::new());
        assert!(matches!(
            s.deliver(Occurrence::value(1i32)),
            Err(NetworkError::Unsupported)
        ));
    }
}
