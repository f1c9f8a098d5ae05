//! Integration tests for the concrete propagation scenarios.

mod support;

use reactive_net::{
    combinators, default_link_fn, Behavior, Clock, EventStream, Link, NetworkConfig, NetworkRef,
    Occurrence, Reactive, ReactiveRef,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn as_ref<T: Reactive + 'static>(r: &Arc<T>) -> ReactiveRef {
    Arc::clone(r) as ReactiveRef
}

#[test]
fn behavior_fan_suppresses_repeated_equal_values() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let b = Behavior::new("b", clock.clone(), 1i32);
    let s = EventStream::new("s", clock);

    let link = Link::new("b->s", vec![as_ref(&b)], vec![as_ref(&s)], default_link_fn).unwrap();
    netref.add_links(vec![link]).unwrap();

    netref.push(as_ref(&b), Occurrence::value(2i32)).unwrap();
    netref.push(as_ref(&b), Occurrence::value(2i32)).unwrap();
    netref.push(as_ref(&b), Occurrence::value(3i32)).unwrap();
    netref.barrier();

    let observed: Vec<i32> = support::drain_as(&s);
    assert_eq!(observed, vec![2, 3]);
}

#[test]
fn event_stream_merge_preserves_delivery_order() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let a = EventStream::new("a", clock.clone());
    let b = EventStream::new("b", clock.clone());

    let c = combinators::merge(&netref, "merge", clock, as_ref(&a), as_ref(&b));

    netref.push(as_ref(&a), Occurrence::value(1i32)).unwrap();
    netref.barrier();
    netref.push(as_ref(&b), Occurrence::value(2i32)).unwrap();
    netref.barrier();
    netref.push(as_ref(&a), Occurrence::value(3i32)).unwrap();
    netref.barrier();

    let observed: Vec<i32> = support::drain_as(&c);
    assert_eq!(observed, vec![1, 2, 3]);
}

#[test]
fn concat_drains_first_source_before_second() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let a = EventStream::new("a", clock.clone());
    let b = EventStream::new("b", clock.clone());

    let c = combinators::concat(&netref, "concat", clock, as_ref(&a), as_ref(&b));

    // Queued behind `a`: no link touches `b` yet, so these just sit in
    // its buffer.
    netref.push(as_ref(&b), Occurrence::value(10i32)).unwrap();
    netref.push(as_ref(&b), Occurrence::value(20i32)).unwrap();
    netref.barrier();

    netref.complete(as_ref(&a)).unwrap();
    netref.barrier();

    netref.push(as_ref(&b), Occurrence::value(30i32)).unwrap();
    netref.barrier();

    let observed: Vec<i32> = support::drain_as(&c);
    assert_eq!(observed, vec![10, 20, 30]);
}

#[test]
fn take_two_completes_after_second_value() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let s = EventStream::new("s", clock.clone());

    let out = combinators::take(&netref, "take2", clock, as_ref(&s), 2);

    netref.push(as_ref(&s), Occurrence::value(1i32)).unwrap();
    netref.push(as_ref(&s), Occurrence::value(2i32)).unwrap();
    netref.push(as_ref(&s), Occurrence::value(3i32)).unwrap();
    netref.barrier();

    let observed: Vec<i32> = support::drain_as(&out);
    assert_eq!(observed, vec![1, 2]);
    assert!(out.completed());
}

#[test]
fn overflow_retry_eventually_delivers_every_value() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let s = EventStream::with_capacity("s", clock, 2);
    let s_ref = as_ref(&s);

    netref.push(s_ref.clone(), Occurrence::value(1i32)).unwrap();
    netref.push(s_ref.clone(), Occurrence::value(2i32)).unwrap();
    netref.push(s_ref.clone(), Occurrence::value(3i32)).unwrap();

    // A deliberately slow consumer: give the retry path room to succeed
    // once space frees up.
    std::thread::sleep(Duration::from_millis(20));
    let mut observed = Vec::new();
    for _ in 0..3 {
        if let Some((v, _)) = s.consume() {
            observed.push(*v.downcast_ref::<i32>().unwrap());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    netref.barrier();
    observed.extend(support::drain_as::<i32>(&s));

    assert_eq!(observed, vec![1, 2, 3]);
}

#[test]
fn async_link_output_arrives_after_placeholder_cycle() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let x = Behavior::new("x", clock.clone(), 0i32);
    let out = EventStream::new("out", clock);
    let out_ref = as_ref(&out);

    let link = Link::from_value_fn("double", vec![as_ref(&x)], vec![out_ref.clone()], |rvts| {
        let (v, _) = &rvts[0];
        let n = *v.downcast_ref::<i32>().unwrap();
        Occurrence::value(n * 2)
    })
    .unwrap()
    .with_executor(Arc::new(reactive_net::ThreadExecutor));

    netref.add_links(vec![link]).unwrap();
    netref.push(as_ref(&x), Occurrence::value(5i32)).unwrap();
    netref.barrier();
    // give the detached executor thread time to report back
    std::thread::sleep(Duration::from_millis(50));
    netref.barrier();

    let observed: Vec<i32> = support::drain_as(&out);
    assert_eq!(observed, vec![10]);
}

#[test]
fn link_fn_panic_reaches_registered_error_hook() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let s = EventStream::new("s", clock.clone());
    let out = EventStream::new("out", clock);

    let fired = Arc::new(AtomicBool::new(false));
    let fired_for_hook = Arc::clone(&fired);
    netref.on_error(as_ref(&out), move |_exception| {
        fired_for_hook.store(true, Ordering::SeqCst);
    });

    let link = Link::new("panics", vec![as_ref(&s)], vec![as_ref(&out)], |_input| {
        panic!("boom");
    })
    .unwrap();
    netref.add_links(vec![link]).unwrap();

    netref.push(as_ref(&s), Occurrence::value(1i32)).unwrap();
    netref.barrier();

    assert!(fired.load(Ordering::SeqCst));
}

#[test]
fn auto_completion_waits_for_every_complete_on_remove_link() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let a = EventStream::new("a", clock.clone());
    let b = EventStream::new("b", clock.clone());
    let out = EventStream::new("out", clock);
    let out_ref = as_ref(&out);

    let link_a = Link::new("a->out", vec![as_ref(&a)], vec![out_ref.clone()], default_link_fn)
        .unwrap()
        .with_complete_on_remove(vec![out_ref.clone()]);
    let link_b = Link::new("b->out", vec![as_ref(&b)], vec![out_ref.clone()], default_link_fn)
        .unwrap()
        .with_complete_on_remove(vec![out_ref.clone()]);

    netref.add_links(vec![link_a, link_b]).unwrap();
    netref.barrier();

    netref.remove_links(|l| l.label == "a->out").unwrap();
    netref.barrier();
    assert!(!out.completed());

    netref.remove_links(|l| l.label == "b->out").unwrap();
    netref.barrier();
    assert!(out.completed());
}

#[test]
fn seeded_reactives_observe_global_level_ordering() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let a = EventStream::new("a", clock.clone());
    let mid = EventStream::new("mid", clock.clone());
    let end = EventStream::new("end", clock);

    let order_1 = Arc::clone(&order);
    let link1 = Link::new("a->mid", vec![as_ref(&a)], vec![as_ref(&mid)], move |input| {
        order_1.lock().unwrap().push("a->mid");
        default_link_fn(input)
    })
    .unwrap();
    let order_2 = Arc::clone(&order);
    let link2 = Link::new("mid->end", vec![as_ref(&mid)], vec![as_ref(&end)], move |input| {
        order_2.lock().unwrap().push("mid->end");
        default_link_fn(input)
    })
    .unwrap();

    netref.add_links(vec![link1, link2]).unwrap();
    netref.push(as_ref(&a), Occurrence::value(1i32)).unwrap();
    netref.barrier();

    assert_eq!(*order.lock().unwrap(), vec!["a->mid", "mid->end"]);
    assert_eq!(support::drain_as::<i32>(&end), vec![1]);
}

#[test]
fn map_completes_its_output_when_input_completes() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let s = EventStream::new("s", clock.clone());

    let doubled = combinators::map(&netref, "double", clock, as_ref(&s), |v| {
        let n = *v.downcast_ref::<i32>().unwrap();
        Arc::new(n * 2) as reactive_net::Value
    });

    netref.push(as_ref(&s), Occurrence::value(21i32)).unwrap();
    netref.barrier();
    assert_eq!(support::drain_as::<i32>(&doubled), vec![42]);
    assert!(!doubled.completed());

    netref.complete(as_ref(&s)).unwrap();
    netref.barrier();
    assert!(doubled.completed());
}

#[test]
fn merge_output_completes_only_after_both_sources_complete() {
    let netref = NetworkRef::new();
    let clock = Arc::new(Clock::new());
    let a = EventStream::new("a", clock.clone());
    let b = EventStream::new("b", clock.clone());

    let c = combinators::merge(&netref, "merge", clock, as_ref(&a), as_ref(&b));

    netref.remove_links(|l| l.label == "merge:a").unwrap();
    netref.barrier();
    assert!(!c.completed());

    netref.remove_links(|l| l.label == "merge:b").unwrap();
    netref.barrier();
    assert!(c.completed());
}

#[test]
fn network_config_rebuild_threshold_is_respected() {
    let config = NetworkConfig { rebuild_threshold: 2 };
    let mut network = reactive_net::Network::with_config(config);
    let clock = Arc::new(Clock::new());
    let input = EventStream::new("in", clock.clone());
    let output = EventStream::new("out", clock);

    for i in 0..5 {
        let link = Link::new(format!("l{i}"), vec![as_ref(&input)], vec![as_ref(&output)], default_link_fn).unwrap();
        let id = network.add_link(link);
        network.remove_links(|l| l.label == format!("l{i}"));
        let _ = id;
    }

    assert_eq!(network.link_count(), 0);
}
