use super::Reactive;
use crate::error::NetworkError;
use crate::value::{downcast, Clock, Occurrence, Rvt, Timestamp, Value};
use std::fmt;
use std::sync::{Arc, Mutex};

struct Cell<T> {
    value: T,
    ts: Timestamp,
    /// Set on `deliver`, cleared on `consume`. Drives `pending()`.
    new: bool,
    /// Flips false when `COMPLETED` is delivered.
    live: bool,
}

/// A continuous reactive: always has a current value, and a delivered
/// value equal (by `PartialEq`) to the one already held is dropped rather
/// than causing propagation (§3, "Behavior's equal value dropped rule").
pub struct Behavior<T> {
    label: String,
    clock: Arc<Clock>,
    cell: Mutex<Cell<T>>,
}

impl<T> Behavior<T>
where
    T: PartialEq + Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new(label: impl Into<String>, clock: Arc<Clock>, initial: T) -> Arc<Self> {
        let ts = clock.tick();
        Arc::new(Self {
            label: label.into(),
            clock,
            cell: Mutex::new(Cell {
                value: initial,
                ts,
                new: false,
                live: true,
            }),
        })
    }

    /// The current value and its timestamp, regardless of `pending()`.
    pub fn current(&self) -> (T, Timestamp) {
        let cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        (cell.value.clone(), cell.ts)
    }
}

impl<T> fmt::Debug for Behavior<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("Behavior")
            .field("label", &self.label)
            .field("value", &cell.value)
            .field("live", &cell.live)
            .finish()
    }
}

impl<T> Reactive for Behavior<T>
where
    T: PartialEq + Clone + Send + Sync + fmt::Debug + 'static,
{
    fn next_value(&self) -> Option<Rvt> {
        let cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if cell.live {
            Some((Arc::new(cell.value.clone()) as Value, cell.ts))
        } else {
            None
        }
    }

    fn available(&self) -> bool {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).live
    }

    fn pending(&self) -> bool {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).new
    }

    fn completed(&self) -> bool {
        !self.cell.lock().unwrap_or_else(|e| e.into_inner()).live
    }

    fn consume(&self) -> Option<Rvt> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if !cell.live {
            return None;
        }
        cell.new = false;
        Some((Arc::new(cell.value.clone()) as Value, cell.ts))
    }

    fn deliver(&self, occ: Occurrence) -> Result<bool, NetworkError> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if !cell.live {
            return Err(NetworkError::InvalidState);
        }
        match occ {
            Occurrence::Completed => {
                cell.live = false;
                Ok(true)
            }
            Occurrence::Value(v) => {
                let incoming = downcast::<T>(&v).expect(
                    "Behavior delivered a value of a different type than it was created with",
                );
                if *incoming == cell.value {
                    return Ok(false);
                }
                cell.value = incoming.clone();
                cell.ts = self.clock.tick();
                cell.new = true;
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
    fn equal_value_is_dropped() {
        let clock = Arc::new(Clock::new());
        let b = Behavior::new("b", clock, 1i32);
        assert!(b.deliver(Occurrence::value(1i32)).unwrap() == false);
        assert!(!b.pending());
        assert!(b.deliver(Occurrence::value(2i32)).unwrap());
        assert!(b.pending());
    }

    #[test]
    fn completing_makes_it_not_live() {
        let clock = Arc::new(Clock::new());
        let b = Behavior::new("b", clock, 1i32);
        assert!(b.deliver(Occurrence::Completed).unwrap());
        assert!(b.completed());
        assert!(matches!(
            b.deliver(Occurrence::value(5i32)),
            Err(NetworkError::InvalidState)
        ));
    }
}
