//! Single-writer access to a [`Network`] (§5, §6): a cheap, cloneable
//! handle whose mailbox feeds one dedicated worker thread. Grounded on the
//! `ReactiveQueue`/`Apply<T>` mailbox pattern -- a channel of messages
//! consumed by one owner thread, never a lock shared across callers.

use crate::engine::{self, Stimulus};
use crate::error::{LinkException, NetworkError};
use crate::link::Link;
use crate::network::{Network, NetworkConfig};
use crate::reactive::{ptr_key, ReactiveRef};
use crate::value::Occurrence;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

type ErrorHook = Arc<dyn Fn(&LinkException) + Send + Sync>;

enum Message {
    Stimulus(Stimulus),
    AddLinks(Vec<Link>),
    RemoveLinks(Arc<dyn Fn(&Link) -> bool + Send + Sync>),
    Barrier(Sender<()>),
    Shutdown,
}

struct Shared {
    sender: Sender<Message>,
    /// Handlers registered via [`NetworkRef::on_error`], keyed by the
    /// `ptr_key` of the target reactive `r` they were attached to (§6
    /// `on_error(netref, r, error_fn)`).
    error_hooks: Mutex<FxHashMap<usize, ErrorHook>>,
    join: Mutex<Option<std::thread::JoinHandle<()>>>,
}

/// A handle to a running network worker. Clones share the same mailbox and
/// worker thread; the network itself is never touched from any thread but
/// the worker's.
#[derive(Clone)]
pub struct NetworkRef {
    shared: Arc<Shared>,
}

impl NetworkRef {
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Message>();
        let shared = Arc::new(Shared {
            sender: tx,
            error_hooks: Mutex::new(FxHashMap::default()),
            join: Mutex::new(None),
        });
        let netref = Self { shared: Arc::clone(&shared) };
        let worker_netref = netref.clone();
        let join = std::thread::Builder::new()
            .name("reactive-net-worker".into())
            .spawn(move || {
                let mut network = Network::with_config(config);
                for message in rx {
                    match message {
                        Message::Stimulus(stimulus) => {
                            engine::run_to_quiescence(&mut network, worker_netref.clone(), stimulus);
                        }
                        Message::AddLinks(links) => {
                            for link in links {
                                network.add_link(link);
                            }
                        }
                        Message::RemoveLinks(pred) => {
                            let freed = network.remove_links(|link| pred(link));
                            engine::apply_direct_removal(&mut network, &worker_netref, freed);
                        }
                        Message::Barrier(ack) => {
                            let _ = ack.send(());
                        }
                        Message::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn network worker thread");
        *shared.join.lock().unwrap_or_else(|e| e.into_inner()) = Some(join);
        netref
    }

    /// Enqueues `message` on the worker's mailbox. Fails with
    /// [`NetworkError::Disposed`] once the worker thread has shut down
    /// (§10.2) -- the public boundary methods below surface this rather
    /// than silently dropping the message.
    fn send(&self, message: Message) -> Result<(), NetworkError> {
        self.shared.sender.send(message).map_err(|_| NetworkError::Disposed)
    }

    pub(crate) fn submit(&self, stimulus: Stimulus) -> Result<(), NetworkError> {
        self.send(Message::Stimulus(stimulus))
    }

    /// Delivers a value (or `Occurrence::Completed`) into `reactive` and
    /// drives the network to quiescence (§4.4, §6 `push`).
    pub fn push(&self, reactive: ReactiveRef, occ: Occurrence) -> Result<(), NetworkError> {
        self.submit(Stimulus::deliver(reactive, occ))
    }

    /// Convenience over [`NetworkRef::push`] for the common completion case
    /// (§6 `complete`).
    pub fn complete(&self, reactive: ReactiveRef) -> Result<(), NetworkError> {
        self.push(reactive, Occurrence::Completed)
    }

    /// Splices new links into the network outside of any cycle (§6
    /// `add_links`).
    pub fn add_links(&self, links: Vec<Link>) -> Result<(), NetworkError> {
        self.send(Message::AddLinks(links))
    }

    /// Removes links matching `pred` outside of any cycle (§6
    /// `remove_links`).
    pub fn remove_links(
        &self,
        pred: impl Fn(&Link) -> bool + Send + Sync + 'static,
    ) -> Result<(), NetworkError> {
        self.send(Message::RemoveLinks(Arc::new(pred)))
    }

    /// Registers a hook invoked whenever a `link_fn` panics while evaluating
    /// the link whose outputs include `r`, and that link has no `error_fn`
    /// of its own to absorb it (§6 `on_error(netref, r, error_fn)`). A
    /// second call targeting the same `r` replaces the first's handler.
    pub fn on_error(&self, r: ReactiveRef, hook: impl Fn(&LinkException) + Send + Sync + 'static) {
        self.shared
            .error_hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ptr_key(&r), Arc::new(hook));
    }

    /// Invokes every registered [`on_error`](Self::on_error) hook whose
    /// target reactive appears in `outputs` -- the live outputs of the link
    /// whose `link_fn` just panicked.
    pub(crate) fn report_error(&self, outputs: &[ReactiveRef], exception: Arc<LinkException>) {
        let hooks = self.shared.error_hooks.lock().unwrap_or_else(|e| e.into_inner());
        for output in outputs {
            if let Some(hook) = hooks.get(&ptr_key(output)) {
                hook(&exception);
            }
        }
    }

    /// Blocks until every message enqueued before this call has been
    /// processed by the worker. Not part of the core's public surface
    /// (§6 lists no such operation) -- a test-only rendezvous, since the
    /// mailbox otherwise gives no external signal of quiescence.
    pub fn barrier(&self) {
        let (tx, rx) = mpsc::channel();
        if self.send(Message::Barrier(tx)).is_err() {
            return;
        }
        let _ = rx.recv_timeout(std::time::Duration::from_secs(5));
    }

    /// Stops the worker thread, joining it. Any further calls on clones of
    /// this handle return [`NetworkError::Disposed`].
    pub fn shutdown(&self) {
        let _ = self.send(Message::Shutdown);
        if let Some(handle) = self.shared.join.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

impl Default for NetworkRef {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<NetworkRef>> = const { RefCell::new(None) };
}

/// Installs `netref` as this thread's implicit network, returning whatever
/// was previously installed.
pub fn set_current(netref: NetworkRef) -> Option<NetworkRef> {
    CURRENT.with(|cell| cell.borrow_mut().replace(netref))
}

/// Runs `f` with this thread's implicit network, lazily creating one with
/// default configuration on first use (§6: "an implicit default network
/// most programs never need to name explicitly").
pub fn with_netref<R>(f: impl FnOnce(&NetworkRef) -> R) -> R {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let netref = slot.get_or_insert_with(NetworkRef::new);
        f(netref)
    })
}

/// Replaces this thread's implicit network with a fresh, empty one (§6
/// `reset_network`, mainly useful for test isolation).
pub fn reset_network() {
    let fresh = NetworkRef::new();
    set_current(fresh);
}
