//! The value envelope carried between reactives and links.
//!
//! A [`Value`] is a type-erased payload shared across threads (a link-fn may
//! run on a foreign executor thread, see [`crate::link::LinkExecutor`]).
//! [`Occurrence`] wraps every delivered value so the sentinel `COMPLETED`
//! marker (design note in `SPEC_FULL.md` §9) is a distinct, round-tripping
//! variant rather than a magic value of the payload type.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A type-erased value flowing through the network.
pub type Value = Arc<dyn Any + Send + Sync>;

/// A logical, monotonically increasing clock tick assigned by the network
/// to every value it actually accepts. Not wall-clock time: cycle behavior
/// must not depend on system time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Shared source of logical timestamps for a single network.
#[derive(Debug, Default)]
pub struct Clock(AtomicU64);

impl Clock {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next tick, monotonically increasing.
    pub fn tick(&self) -> Timestamp {
        Timestamp(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A value together with the logical time it was produced.
pub type Rvt = (Value, Timestamp);

/// Either a user value or the `COMPLETED` sentinel.
///
/// Kept uniform across all four reactive variants: `deliver` always takes
/// an `Occurrence`, never a bare `Value`.
#[derive(Clone)]
pub enum Occurrence {
    Value(Value),
    Completed,
}

impl Occurrence {
    pub fn value<T: Any + Send + Sync + 'static>(v: T) -> Self {
        Occurrence::Value(Arc::new(v))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Occurrence::Completed)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Occurrence::Value(v) => Some(v),
            Occurrence::Completed => None,
        }
    }
}

impl fmt::Debug for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrence::Value(_) => write!(f, "Occurrence::Value(..)"),
            Occurrence::Completed => write!(f, "Occurrence::Completed"),
        }
    }
}

/// Helper for downcasting a type-erased [`Value`] back to `T`.
pub fn downcast<T: Any + Send + Sync + 'static>(value: &Value) -> Option<&T> {
    value.downcast_ref::<T>()
}
