//! Shared helpers for the integration tests in this directory.

use reactive_net::{downcast, EventStream, Reactive};
use std::time::{Duration, Instant};

/// Drains every value currently queued on `stream`, downcasting each to
/// `T`. Does not wait for more values to arrive; call `netref.barrier()`
/// first so the worker has finished delivering everything it is going to.
pub fn drain_as<T: std::any::Any + Clone + Send + Sync + 'static>(stream: &EventStream) -> Vec<T> {
    let mut out = Vec::new();
    while stream.available() {
        let Some((v, _)) = stream.consume() else { break };
        if let Some(t) = downcast::<T>(&v) {
            out.push(t.clone());
        }
    }
    out
}

/// Polls `stream.completed()` until it is true or `timeout` elapses.
#[allow(dead_code)]
pub fn wait_completed(stream: &EventStream, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if stream.completed() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    stream.completed()
}

/// Polls until `stream` has at least `n` values queued, or `timeout`
/// elapses. Used by the overflow-retry scenario, which pushes faster than
/// a deliberately slow consumer drains.
#[allow(dead_code)]
pub fn wait_for_len(stream: &EventStream, n: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if stream.queue_len() >= n {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    stream.queue_len() >= n
}
