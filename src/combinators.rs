//! Small worked-example combinators built on the public [`Link`]/[`NetworkRef`]
//! surface (`map`, `filter`, `merge`, `concat`, `take`). These are library
//! code, not core engine surface (§1 "out of scope: the combinator
//! library") -- kept here because the testable scenarios in §8 exercise
//! them directly.

use crate::link::Link;
use crate::netref::NetworkRef;
use crate::reactive::{EventStream, Reactive, ReactiveRef};
use crate::value::{downcast, Clock, Occurrence, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn as_dyn(stream: &Arc<EventStream>) -> ReactiveRef {
    Arc::clone(stream) as ReactiveRef
}

/// `map(f, input) -> output`: a single-input link broadcasting `f(value)`
/// to a freshly created [`EventStream`], completing it when `input`
/// completes.
pub fn map<F>(
    netref: &NetworkRef,
    label: impl Into<String>,
    clock: Arc<Clock>,
    input: ReactiveRef,
    f: F,
) -> Arc<EventStream>
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    let label = label.into();
    let out = EventStream::new(format!("{label}:out"), clock);
    let out_ref = as_dyn(&out);

    let remove_label = label.clone();
    let link = Link::from_value_fn(label.clone(), vec![input], vec![out_ref.clone()], move |rvts| {
        Occurrence::Value(f(&rvts[0].0))
    })
    .expect("map link always has one input")
    .with_complete_fn(move |_link, _completed_input| {
        // The single input completed; nothing further will ever arrive.
        // Remove this link so its `complete_on_remove` hold on `out` is
        // released, completing `out` in turn (§4.5).
        let remove_label = remove_label.clone();
        let mut result = crate::link::LinkResult::new();
        result.remove_by = Some(Arc::new(move |l: &Link| l.label == remove_label));
        Some(result)
    })
    .with_complete_on_remove(vec![out_ref]);

    let _ = netref.add_links(vec![link]);
    out
}

/// `filter(pred, input) -> output`: forwards only values for which `pred`
/// returns `true`; all other cycles produce no output (`no_consume` left
/// unset, since the input is still consumed either way).
pub fn filter<F>(
    netref: &NetworkRef,
    label: impl Into<String>,
    clock: Arc<Clock>,
    input: ReactiveRef,
    pred: F,
) -> Arc<EventStream>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    let label = label.into();
    let out = EventStream::new(format!("{label}:out"), clock);
    let out_ref = as_dyn(&out);

    let remove_label = label.clone();
    let out_for_fn = out_ref.clone();
    let link = Link::new(label, vec![input], vec![out_ref.clone()], move |invocation| {
        let (value, _) = &invocation.input_rvts[0].1;
        if !pred(value) {
            return None;
        }
        let mut result = crate::link::LinkResult::new();
        result.output_rvts = vec![(out_for_fn.clone(), Occurrence::Value(value.clone()))];
        Some(result)
    })
    .expect("filter link always has one input")
    .with_complete_fn(move |_link, _completed_input| {
        let remove_label = remove_label.clone();
        let mut result = crate::link::LinkResult::new();
        result.remove_by = Some(Arc::new(move |l: &Link| l.label == remove_label));
        Some(result)
    })
    .with_complete_on_remove(vec![out_ref]);

    let _ = netref.add_links(vec![link]);
    out
}

/// `merge(a, b) -> output`: two independent single-input links both
/// forwarding into the same destination. Each input is observed on its
/// own schedule; there is no synchronization between `a` and `b`.
pub fn merge(
    netref: &NetworkRef,
    label: impl Into<String>,
    clock: Arc<Clock>,
    a: ReactiveRef,
    b: ReactiveRef,
) -> Arc<EventStream> {
    let label = label.into();
    let out = EventStream::new(format!("{label}:out"), clock);
    let out_ref = as_dyn(&out);

    let link_a = Link::new(format!("{label}:a"), vec![a], vec![out_ref.clone()], crate::link::default_link_fn)
        .expect("merge links always have one input")
        .with_complete_on_remove(vec![out_ref.clone()]);
    let link_b = Link::new(format!("{label}:b"), vec![b], vec![out_ref.clone()], crate::link::default_link_fn)
        .expect("merge links always have one input")
        .with_complete_on_remove(vec![out_ref]);

    let _ = netref.add_links(vec![link_a, link_b]);
    out
}

/// `concat(a, b) -> output`: drains `a` fully first; only once `a`
/// completes is a link from `b` spliced in, so any values already queued
/// on `b` wait behind `a` until then.
pub fn concat(
    netref: &NetworkRef,
    label: impl Into<String>,
    clock: Arc<Clock>,
    a: ReactiveRef,
    b: ReactiveRef,
) -> Arc<EventStream> {
    let label = label.into();
    let out = EventStream::new(format!("{label}:out"), clock);
    let out_ref = as_dyn(&out);
    let b_label = format!("{label}:b");
    let first_label = format!("{label}:a");
    let remove_label = first_label.clone();

    let b_for_closure = b.clone();
    let out_for_closure = out_ref.clone();
    let b_label_for_closure = b_label.clone();
    let b_label_for_removal = b_label.clone();
    let link_a = Link::new(first_label, vec![a], vec![out_ref.clone()], crate::link::default_link_fn)
        .expect("concat's first link always has one input")
        .with_complete_fn(move |_link, _completed_input| {
            let link_b = Link::new(
                b_label_for_closure.clone(),
                vec![b_for_closure.clone()],
                vec![out_for_closure.clone()],
                crate::link::default_link_fn,
            )
            .expect("concat's second link always has one input")
            .with_complete_on_remove(vec![out_for_closure.clone()])
            .with_complete_fn({
                let b_label = b_label_for_removal.clone();
                move |_link, _completed_input| {
                    let b_label = b_label.clone();
                    let mut result = crate::link::LinkResult::new();
                    result.remove_by = Some(Arc::new(move |l: &Link| l.label == b_label));
                    Some(result)
                }
            });
            let mut result = crate::link::LinkResult::new();
            result.add = vec![link_b];
            result.remove_by = Some(Arc::new(move |l: &Link| l.label == remove_label));
            Some(result)
        })
        .with_complete_on_remove(vec![out_ref.clone()]);

    let _ = netref.add_links(vec![link_a]);
    out
}

/// `take(n, input) -> output`: forwards the first `n` values from `input`
/// then completes `output` and removes itself.
pub fn take(
    netref: &NetworkRef,
    label: impl Into<String>,
    clock: Arc<Clock>,
    input: ReactiveRef,
    n: usize,
) -> Arc<EventStream> {
    let label = label.into();
    let out = EventStream::new(format!("{label}:out"), clock);
    let out_ref = as_dyn(&out);
    let seen = Arc::new(AtomicUsize::new(0));
    let remove_label = label.clone();
    let out_for_closure = out_ref.clone();

    let link = Link::new(label, vec![input], vec![out_ref.clone()], move |invocation| {
        let (value, _) = invocation.input_rvts[0].1.clone();
        let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
        let mut result = crate::link::LinkResult::new();
        if count >= n {
            result.output_rvts = vec![
                (out_for_closure.clone(), Occurrence::Value(value)),
                (out_for_closure.clone(), Occurrence::Completed),
            ];
            let remove_label = remove_label.clone();
            result.remove_by = Some(Arc::new(move |l: &Link| l.label == remove_label));
        } else {
            result.output_rvts = vec![(out_for_closure.clone(), Occurrence::Value(value))];
        }
        Some(result)
    })
    .expect("take link always has one input")
    .with_complete_on_remove(vec![out_ref]);

    let _ = netref.add_links(vec![link]);
    out
}

/// Reads every currently-available value out of an event stream into a
/// `Vec<T>`, downcasting each. Test/example helper, not part of the
/// engine's public surface.
pub fn drain_as<T: std::any::Any + Clone + Send + Sync + 'static>(stream: &EventStream) -> Vec<T> {
    let mut out = Vec::new();
    while stream.available() {
        if let Some((v, _)) = stream.consume() {
            if let Some(t) = downcast::<T>(&v) {
                out.push(t.clone());
            }
        } else {
            break;
        }
    }
    out
}
