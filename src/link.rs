//! The link abstraction (§3, §4.2): a static hyperedge from input
//! reactives to output reactives with an evaluation function.

use crate::error::{LinkException, NetworkError};
use crate::netref::NetworkRef;
use crate::reactive::{ptr_key, ReactiveRef};
use crate::value::{Occurrence, Rvt};
use std::fmt;
use std::sync::{Arc, Weak};

/// The message exchanged with a `link_fn`: inputs on the way in, outputs
/// and graph edits on the way out. A single struct with orthogonal
/// optional fields (SPEC_FULL.md §9) rather than a sum type.
#[derive(Clone, Default)]
pub struct LinkResult {
    /// The link's input reactives, upgraded to strong refs for this call.
    pub input_reactives: Vec<ReactiveRef>,
    /// The link's output reactives, upgraded to strong refs for this call.
    pub output_reactives: Vec<ReactiveRef>,
    /// Peeked `(value, timestamp)` for each input reactive, same order as
    /// `input_reactives`.
    pub input_rvts: Vec<(ReactiveRef, Rvt)>,
    /// Values (or completions) to deliver to output reactives.
    pub output_rvts: Vec<(ReactiveRef, Occurrence)>,
    /// Suppress the default per-cycle consume of this link's inputs.
    pub no_consume: bool,
    /// A caught `link_fn` panic, if any.
    pub exception: Option<Arc<LinkException>>,
    /// New links to splice into the network.
    pub add: Vec<Link>,
    /// Remove links matching this predicate.
    pub remove_by: Option<RemovePredicate>,
    /// Raise the alive-counter of these reactives (keeps them alive across
    /// an async round trip, §4.5).
    pub dont_complete: Vec<ReactiveRef>,
    /// Lower the alive-counter of these reactives.
    pub allow_complete: Vec<ReactiveRef>,
}

impl LinkResult {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for LinkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkResult")
            .field("output_rvts", &self.output_rvts.len())
            .field("no_consume", &self.no_consume)
            .field("has_exception", &self.exception.is_some())
            .field("add", &self.add.len())
            .field("remove_by", &self.remove_by.is_some())
            .field("dont_complete", &self.dont_complete.len())
            .field("allow_complete", &self.allow_complete.len())
            .finish()
    }
}

/// A predicate selecting links to remove (`Result.remove_by`).
pub type RemovePredicate = Arc<dyn Fn(&Link) -> bool + Send + Sync>;

/// `link_fn`: `Result -> Result?`.
pub type LinkFn = Arc<dyn Fn(&LinkResult) -> Option<LinkResult> + Send + Sync>;

/// `complete_fn`: fired when a specific input reactive completes.
pub type CompleteFn = Arc<dyn Fn(&Link, &ReactiveRef) -> Option<LinkResult> + Send + Sync>;

/// Runs a link's evaluation off the worker thread and reports the result
/// back through a [`NetworkRef`] as a follow-up stimulus (§4.4d, §5).
///
/// The core only specifies this interface; the thread-pool behind it is an
/// external collaborator (§1). [`ThreadExecutor`] is the crate's minimal
/// default.
pub trait LinkExecutor: Send + Sync {
    fn execute(&self, netref: NetworkRef, job: Box<dyn FnOnce() -> Option<LinkResult> + Send>);
}

/// Spawns a bare OS thread per job. Adequate for tests and small examples;
/// production users are expected to supply an executor backed by a real
/// thread pool (out of scope, §1).
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl LinkExecutor for ThreadExecutor {
    fn execute(&self, _netref: NetworkRef, job: Box<dyn FnOnce() -> Option<LinkResult> + Send>) {
        std::thread::spawn(job);
    }
}

/// An immutable directed hyperedge: fan-in reactives, fan-out reactives
/// (held weakly), and the function that transforms one into the other.
#[derive(Clone)]
pub struct Link {
    pub label: String,
    pub inputs: Vec<ReactiveRef>,
    pub outputs: Vec<Weak<dyn crate::reactive::Reactive>>,
    pub link_fn: LinkFn,
    pub error_fn: Option<LinkFn>,
    pub complete_fn: Option<CompleteFn>,
    pub complete_on_remove: Vec<ReactiveRef>,
    pub executor: Option<Arc<dyn LinkExecutor>>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("label", &self.label)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("is_async", &self.executor.is_some())
            .finish()
    }
}

impl Link {
    /// Builds a link from a `Result -> Result?` function (§9, "link_fn
    /// polymorphism": this and [`Link::from_value_fn`] are two adapters
    /// producing the same underlying [`LinkFn`]).
    pub fn new(
        label: impl Into<String>,
        inputs: Vec<ReactiveRef>,
        outputs: Vec<ReactiveRef>,
        link_fn: impl Fn(&LinkResult) -> Option<LinkResult> + Send + Sync + 'static,
    ) -> Result<Self, NetworkError> {
        if inputs.is_empty() {
            return Err(NetworkError::LinkInputsEmpty);
        }
        Ok(Self {
            label: label.into(),
            inputs,
            outputs: outputs.iter().map(Arc::downgrade).collect(),
            link_fn: Arc::new(link_fn),
            error_fn: None,
            complete_fn: None,
            complete_on_remove: Vec::new(),
            executor: None,
        })
    }

    /// Builds a link from a plain value function: single input broadcasts
    /// `f(value)` to every output (the `default_link_fn` fan, §4.2,
    /// generalized to an arbitrary transform).
    pub fn from_value_fn<F>(
        label: impl Into<String>,
        inputs: Vec<ReactiveRef>,
        outputs: Vec<ReactiveRef>,
        f: F,
    ) -> Result<Self, NetworkError>
    where
        F: Fn(&[Rvt]) -> Occurrence + Send + Sync + 'static,
    {
        Self::new(label, inputs, outputs, move |input| {
            let values: Vec<Rvt> = input.input_rvts.iter().map(|(_, rvt)| rvt.clone()).collect();
            let occ = f(&values);
            let mut result = LinkResult::new();
            result.output_rvts = input
                .output_reactives
                .iter()
                .cloned()
                .map(|o| (o, occ.clone()))
                .collect();
            Some(result)
        })
    }

    pub fn with_error_fn(
        mut self,
        error_fn: impl Fn(&LinkResult) -> Option<LinkResult> + Send + Sync + 'static,
    ) -> Self {
        self.error_fn = Some(Arc::new(error_fn));
        self
    }

    pub fn with_complete_fn(
        mut self,
        complete_fn: impl Fn(&Link, &ReactiveRef) -> Option<LinkResult> + Send + Sync + 'static,
    ) -> Self {
        self.complete_fn = Some(Arc::new(complete_fn));
        self
    }

    pub fn with_complete_on_remove(mut self, reactives: Vec<ReactiveRef>) -> Self {
        self.complete_on_remove = reactives;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn LinkExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Upgrades the weakly-held outputs that are still alive.
    pub(crate) fn live_outputs(&self) -> Vec<ReactiveRef> {
        self.outputs.iter().filter_map(Weak::upgrade).collect()
    }

    /// An output set exists but every output has either completed or been
    /// collected, or any input has completed (§4.3 "dead").
    pub(crate) fn is_dead(&self) -> bool {
        if self.inputs.iter().any(|i| i.completed()) {
            return true;
        }
        if self.outputs.is_empty() {
            return false;
        }
        self.outputs
            .iter()
            .all(|o| o.upgrade().map(|o| o.completed()).unwrap_or(true))
    }

    /// All inputs `available` and not dead (§4.3 "ready").
    pub(crate) fn is_ready(&self) -> bool {
        !self.is_dead() && self.inputs.iter().all(|i| i.available())
    }

    pub(crate) fn input_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs.iter().map(ptr_key)
    }
}

/// The `default_link_fn` (§4.2): a fan. One input broadcasts its value
/// directly; many inputs broadcast a vector of their zipped values.
pub fn default_link_fn(input: &LinkResult) -> Option<LinkResult> {
    let occ = if input.input_rvts.len() == 1 {
        Occurrence::Value(input.input_rvts[0].1 .0.clone())
    } else {
        let values: Vec<_> = input.input_rvts.iter().map(|(_, (v, _))| v.clone()).collect();
        Occurrence::Value(Arc::new(values))
    };
    let mut result = LinkResult::new();
    result.output_rvts = input
        .output_reactives
        .iter()
        .cloned()
        .map(|o| (o, occ.clone()))
        .collect();
    Some(result)
}
