//! The propagation algorithm (§4.4): deliver, evaluate, consume, propagate,
//! repeated to quiescence within one stimulus.

use crate::link::{LinkExecutor, LinkResult, ThreadExecutor};
use crate::netref::NetworkRef;
use crate::network::{LinkId, Network};
use crate::reactive::ReactiveRef;
use crate::value::{Occurrence, Rvt};
use std::sync::Arc;
use tracing::{instrument, trace};

/// One externally-submitted batch: reactives to deliver values/completions
/// into before the cycle loop starts (§4.4a), plus an optional
/// already-computed [`LinkResult`] to apply first (used by async link
/// follow-ups, §4.4d).
pub struct Stimulus {
    pub deliveries: Vec<(ReactiveRef, Occurrence)>,
    pub prior_result: Option<LinkResult>,
}

impl Stimulus {
    pub fn deliver(reactive: ReactiveRef, occ: Occurrence) -> Self {
        Self {
            deliveries: vec![(reactive, occ)],
            prior_result: None,
        }
    }

    pub fn result(result: LinkResult) -> Self {
        Self {
            deliveries: Vec::new(),
            prior_result: Some(result),
        }
    }
}

/// Runs `stimulus` against `network` to quiescence, driving the
/// deliver/evaluate/consume/propagate cycle (§4.4) until no link is ready
/// and no reactive is pending.
#[instrument(skip_all)]
pub fn run_to_quiescence(network: &mut Network, netref: NetworkRef, stimulus: Stimulus) {
    for (reactive, occ) in stimulus.deliveries {
        let is_completion = occ.is_completed();
        let retry_occ = occ.clone();
        match reactive.deliver(occ) {
            Ok(_) if is_completion => fire_complete_fns(network, &netref, &reactive),
            Ok(_) => {}
            Err(crate::error::NetworkError::QueueOverflow { .. }) => {
                // Backpressure (§4.5 / §7): re-enqueue as a fresh stimulus
                // rather than block or drop the producer's value.
                let label = reactive.label().to_string();
                if netref.submit(Stimulus::deliver(reactive, retry_occ)).is_err() {
                    tracing::warn!(reactive = %label, "failed to re-enqueue overflowed delivery: network disposed");
                }
            }
            Err(err) => tracing::warn!(error = %err, reactive = reactive.label(), "delivery rejected"),
        }
    }

    if let Some(result) = stimulus.prior_result {
        apply_result(network, &netref, result, None);
    }

    loop {
        if !run_one_cycle(network, &netref) {
            break;
        }
    }
}

/// Runs a single deliver/evaluate/consume/propagate cycle. Returns `true`
/// if any work happened (a link fired or a reactive auto-completed),
/// meaning the caller should run another cycle.
fn run_one_cycle(network: &mut Network, netref: &NetworkRef) -> bool {
    let candidates = ready_links(network);
    if candidates.is_empty() {
        return false;
    }

    // Partition by level: only the lowest level present in this batch is
    // safe to evaluate together, since evaluating it may raise the level
    // of (or otherwise affect) higher links before they are considered
    // (§4.4 "current vs pending links").
    let min_level = candidates.iter().map(|(_, level)| *level).min().unwrap();
    let mut current: Vec<LinkId> = candidates
        .iter()
        .filter(|(_, level)| *level == min_level)
        .map(|(id, _)| *id)
        .collect();
    current.sort();

    let mut consumed_inputs: Vec<ReactiveRef> = Vec::new();
    let mut any_fired = false;

    for link_id in &current {
        let Some(entry) = network.links.get(link_id) else {
            continue;
        };
        let link = entry.link.clone();
        if !link.is_ready() {
            continue;
        }

        let input_rvts: Vec<(ReactiveRef, Rvt)> = link
            .inputs
            .iter()
            .filter_map(|i| i.next_value().map(|rvt| (i.clone(), rvt)))
            .collect();
        if input_rvts.len() != link.inputs.len() {
            continue;
        }

        let mut invocation = LinkResult::new();
        invocation.input_reactives = link.inputs.clone();
        invocation.output_reactives = link.live_outputs();
        invocation.input_rvts = input_rvts;

        let result = match &link.executor {
            None => evaluate_sync(&link, &invocation, netref),
            Some(executor) => {
                // Dispatch to the executor and stand in a placeholder
                // Result carrying `dont_complete = outputs` so the outputs'
                // alive-counters are bumped before the worker moves on,
                // keeping them alive until the async round-trip's follow-up
                // stimulus arrives with the matching `allow_complete`
                // (§4.4d, §4.5). The link's inputs were already peeked into
                // `invocation` and are consumed below like any other fired
                // link; the async job works from its own snapshot and will
                // never read them again.
                dispatch_async(netref, link.clone(), executor.clone(), invocation.clone());
                let mut placeholder = LinkResult::new();
                placeholder.dont_complete = invocation.output_reactives.clone();
                Some(placeholder)
            }
        };

        any_fired = true;

        match result {
            Some(result) => {
                if !result.no_consume {
                    consumed_inputs.extend(link.inputs.iter().cloned());
                }
                apply_result(network, netref, result, Some(link_id));
            }
            None => {
                // §4.2: "None (no propagation, inputs *are still*
                // consumed unless `no_consume` is set)" -- there is no
                // Result here to carry `no_consume`, so the default
                // (consume) applies. Without this, a link_fn that
                // declines every cycle (e.g. `filter`'s predicate
                // rejecting a value) would leave its input forever
                // `pending()`, and `run_to_quiescence` would never reach
                // quiescence.
                consumed_inputs.extend(link.inputs.iter().cloned());
            }
        }
    }

    // Consume stage: an input already consumed by one current link this
    // cycle is not consumed again, and a reactive that is still an input
    // to a pending (not-yet-evaluated, higher-level) link in this same
    // cycle retains its value for that link (§4.4 consume rule).
    let pending_ids: Vec<LinkId> = candidates
        .iter()
        .filter(|(id, level)| *level != min_level || !current.contains(id))
        .map(|(id, _)| *id)
        .collect();
    let pending_input_keys: std::collections::HashSet<usize> = pending_ids
        .iter()
        .filter_map(|id| network.links.get(id))
        .flat_map(|entry| entry.link.input_keys())
        .collect();

    let mut already_consumed: std::collections::HashSet<usize> = std::collections::HashSet::new();
    for input in consumed_inputs {
        let key = crate::reactive::ptr_key(&input);
        if already_consumed.contains(&key) {
            continue;
        }
        if pending_input_keys.contains(&key) {
            continue;
        }
        input.consume();
        already_consumed.insert(key);
    }

    any_fired
}

fn evaluate_sync(link: &crate::link::Link, invocation: &LinkResult, netref: &NetworkRef) -> Option<LinkResult> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (link.link_fn)(invocation)
    }));
    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let exception = Arc::new(crate::error::LinkException::from_panic(payload));
            tracing::error!(link = %link.label, error = %exception, "link_fn panicked");
            match &link.error_fn {
                Some(error_fn) => {
                    let mut err_invocation = invocation.clone();
                    err_invocation.exception = Some(exception);
                    error_fn(&err_invocation)
                }
                None => {
                    netref.report_error(&invocation.output_reactives, exception);
                    None
                }
            }
        }
    }
}

fn dispatch_async(
    netref: &NetworkRef,
    link: crate::link::Link,
    executor: Arc<dyn LinkExecutor>,
    invocation: LinkResult,
) {
    let netref_for_execute = netref.clone();
    let netref_for_error = netref.clone();
    let netref_for_stimulus = netref.clone();
    // Released via `allow_complete` once the job reports back, matching the
    // `dont_complete` the placeholder Result raised in `run_one_cycle`
    // (§4.4d, §4.5).
    let outputs_to_release = invocation.output_reactives.clone();
    let link_fn = link.link_fn.clone();
    let error_fn = link.error_fn.clone();
    let label = link.label.clone();
    let job: Box<dyn FnOnce() -> Option<LinkResult> + Send> = Box::new(move || {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| link_fn(&invocation)));
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let exception = Arc::new(crate::error::LinkException::from_panic(payload));
                tracing::error!(link = %label, error = %exception, "async link_fn panicked");
                match &error_fn {
                    Some(error_fn) => {
                        let mut err_invocation = invocation.clone();
                        err_invocation.exception = Some(exception);
                        error_fn(&err_invocation)
                    }
                    None => {
                        netref_for_error.report_error(&invocation.output_reactives, exception);
                        None
                    }
                }
            }
        }
    });
    // The executor runs `job` off-thread; whatever it returns is re-submitted
    // as a follow-up stimulus, with `allow_complete` extended to release the
    // placeholder's hold regardless of whether the job produced a Result, so
    // the result re-enters the single-writer worker loop rather than
    // mutating the network from a foreign thread (§4.4d, §5).
    let wrapped: Box<dyn FnOnce() -> Option<LinkResult> + Send> = Box::new(move || {
        let result = job();
        let mut to_submit = result.clone().unwrap_or_default();
        to_submit.allow_complete.extend(outputs_to_release.iter().cloned());
        let _ = netref_for_stimulus.submit(Stimulus::result(to_submit));
        result
    });
    executor.execute(netref_for_execute, wrapped);
}

/// Applies a [`LinkResult`] to the network: dispatches `output_rvts`
/// (§4.4f upstream/downstream/completed partition), splices graph edits,
/// adjusts alive-counters, and fires `complete_fn` callbacks (§4.4h,
/// §4.5).
fn apply_result(
    network: &mut Network,
    netref: &NetworkRef,
    result: LinkResult,
    originating_link: Option<&LinkId>,
) {
    if let Some(exception) = &result.exception {
        tracing::warn!(error = %exception, "link reported exception");
    }

    let current_level = originating_link.and_then(|id| network.level_of_link(*id));
    let mut completed_targets: Vec<ReactiveRef> = result.allow_complete.clone();

    for (reactive, occ) in &result.output_rvts {
        match occ {
            Occurrence::Completed => completed_targets.push(reactive.clone()),
            Occurrence::Value(_) => {
                let target_level = network.level_of_reactive(reactive);
                let upstream = match (target_level, current_level) {
                    // §4.4f: "unknown, or strictly less than the current
                    // level" -- equal-level targets are delivered downstream
                    // this cycle, not deferred.
                    (Some(t), Some(c)) => t < c,
                    (None, _) => true,
                    (_, None) => false,
                };
                if upstream {
                    if netref.submit(Stimulus::deliver(reactive.clone(), occ.clone())).is_err() {
                        trace!(reactive = reactive.label(), "failed to defer upstream value: network disposed");
                    }
                } else if let Err(err) = reactive.deliver(occ.clone()) {
                    trace!(error = %err, reactive = reactive.label(), "output delivery skipped");
                }
            }
        }
    }

    if let Some(pred) = &result.remove_by {
        let freed = network.remove_links(|link| pred(link));
        completed_targets.extend(freed);
    }

    for link in result.add {
        network.add_link(link);
    }

    // A reactive can land in `completed_targets` more than once in the same
    // call (e.g. a link both emits `(out, Completed)` in `output_rvts` and
    // removes itself, and its own `complete_on_remove` also names `out`).
    // Each distinct hold should only be released once per call.
    let mut seen = std::collections::HashSet::new();
    completed_targets.retain(|r| seen.insert(crate::reactive::ptr_key(r)));

    if !result.dont_complete.is_empty() || !completed_targets.is_empty() {
        let newly_dead = network.adjust_alive(&result.dont_complete, &completed_targets);
        complete_all(network, netref, &newly_dead);
    }

    let _ = originating_link;
}

/// Applies the `complete_on_remove` fallout of a direct (outside any
/// cycle) `remove_links` call -- the same alive-counter bookkeeping a
/// link-triggered `remove_by` gets via [`apply_result`].
pub(crate) fn apply_direct_removal(network: &mut Network, netref: &NetworkRef, freed: Vec<ReactiveRef>) {
    if freed.is_empty() {
        return;
    }
    let newly_dead = network.adjust_alive(&[], &freed);
    complete_all(network, netref, &newly_dead);
}

fn complete_all(network: &mut Network, netref: &NetworkRef, reactives: &[ReactiveRef]) {
    for r in reactives {
        match r.deliver(Occurrence::Completed) {
            Ok(_) => fire_complete_fns(network, netref, r),
            Err(err) => trace!(error = %err, reactive = r.label(), "auto-complete delivery skipped"),
        }
    }
}

fn fire_complete_fns(network: &mut Network, netref: &NetworkRef, completed: &ReactiveRef) {
    let Some(reactive_id) = network.id_of(completed) else {
        return;
    };
    let dependent_links = network.links_with_input(reactive_id);
    let mut followups = Vec::new();
    for link_id in dependent_links {
        let Some(entry) = network.links.get(&link_id) else {
            continue;
        };
        let Some(complete_fn) = entry.link.complete_fn.clone() else {
            continue;
        };
        let link = entry.link.clone();
        if let Some(result) = complete_fn(&link, completed) {
            followups.push(result);
        }
    }
    for result in followups {
        apply_result(network, netref, result, None);
    }
}

/// Candidate links: ready (§4.3), with at least one input actually
/// `pending()`, and assigned a level. A link whose only inputs are
/// continuously-`available` behaviors must not fire on its own -- it is
/// only sampled when some other, genuinely pending input drives it
/// (§4.1 "a behavior never initiates a cycle by itself").
fn ready_links(network: &Network) -> Vec<(LinkId, u32)> {
    let mut out: Vec<(LinkId, u32)> = network
        .links
        .iter()
        .filter(|(_, entry)| {
            entry.link.is_ready() && entry.link.inputs.iter().any(|i| i.pending())
        })
        .map(|(id, entry)| (*id, entry.level))
        .collect();
    out.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    out
}

pub fn default_executor() -> Arc<dyn LinkExecutor> {
    Arc::new(ThreadExecutor)
}
