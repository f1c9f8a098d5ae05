use super::Reactive;
use crate::error::NetworkError;
use crate::value::{Clock, Occurrence, Rvt, Timestamp, Value};
use std::fmt;
use std::sync::Arc;

/// A behavior that samples a pure function on every read. It is always
/// `available()` but never `pending()` -- it cannot, by itself, initiate a
/// propagation cycle; a caller must `push!` into the network, or a
/// combinator must schedule sampling (§4.1).
pub struct FnBehavior {
    label: String,
    clock: Arc<Clock>,
    f: Box<dyn Fn() -> Value + Send + Sync>,
}

impl FnBehavior {
    pub fn new(
        label: impl Into<String>,
        clock: Arc<Clock>,
        f: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            clock,
            f: Box::new(f),
        })
    }
}

impl fmt::Debug for FnBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBehavior").field("label", &self.label).finish()
    }
}

impl Reactive for FnBehavior {
    fn next_value(&self) -> Option<Rvt> {
        Some(((self.f)(), self.now()))
    }

    fn available(&self) -> bool {
        true
    }

    fn pending(&self) -> bool {
        false
    }

    fn completed(&self) -> bool {
        false
    }

    fn consume(&self) -> Option<Rvt> {
        Some(((self.f)(), self.now()))
    }

    fn deliver(&self, _occ: Occurrence) -> Result<bool, NetworkError> {
        Err(NetworkError::Unsupported)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl FnBehavior {
    fn now(&self) -> Timestamp {
        self.clock.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn samples_on_every_read() {
        let clock = Arc::new(Clock::new());
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let b = FnBehavior::new("b", clock, move || {
            Arc::new(c.fetch_add(1, Ordering::SeqCst)) as Value
        });
        assert!(!b.pending());
        let (v1, _) = b.consume().unwrap();
        let (v2, _) = b.consume().unwrap();
        assert_ne!(*v1.downcast_ref::<i32>().unwrap(), *v2.downcast_ref::<i32>().unwrap());
    }
}
