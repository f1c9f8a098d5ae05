//! The reactive abstraction (§3, §4.1) and its four concrete variants.

mod behavior;
mod event_stream;
mod fn_behavior;
mod seq_stream;

pub use behavior::Behavior;
pub use event_stream::EventStream;
pub use fn_behavior::FnBehavior;
pub use seq_stream::SeqStream;

use crate::error::NetworkError;
use crate::value::{Occurrence, Rvt};
use std::fmt::Debug;
use std::sync::Arc;

/// A source of time-stamped values: a continuous behavior or a discrete
/// event stream. Implementations must be safely readable from any thread
/// (the network map itself is only ever touched on the worker, but
/// reactive state is shared with arbitrary producer threads) -- see
/// SPEC_FULL.md §5.
pub trait Reactive: Send + Sync + Debug {
    /// Peek the current/head value without consuming it.
    fn next_value(&self) -> Option<Rvt>;

    /// A value is ready to be read right now.
    fn available(&self) -> bool;

    /// A value is waiting that should cause propagation to run.
    fn pending(&self) -> bool;

    /// Terminal state: no further values are accepted or produced.
    fn completed(&self) -> bool;

    /// Read and advance past the current value.
    fn consume(&self) -> Option<Rvt>;

    /// Push a value (or the `COMPLETED` sentinel) in. Returns `Ok(true)`
    /// if propagation should run as a result.
    fn deliver(&self, occ: Occurrence) -> Result<bool, NetworkError>;

    /// A short human-readable label, for diagnostics only.
    fn label(&self) -> &str;
}

/// A strong, shareable handle to any reactive variant.
pub type ReactiveRef = Arc<dyn Reactive>;

pub(crate) fn ptr_key(r: &ReactiveRef) -> usize {
    Arc::as_ptr(r) as *const () as usize
}
