//! A propagation-network runtime for functional reactive programming.
//!
//! Time-varying values ("reactives": [`Behavior`], [`EventStream`],
//! [`SeqStream`], [`FnBehavior`]) are connected through transformation
//! edges ("links") into a [`Network`]. External callers submit stimuli
//! through a [`NetworkRef`], whose single worker thread drives the
//! propagation engine to quiescence and commits the result before
//! draining the next one.
//!
//! ```ignore
//! let netref = NetworkRef::new();
//! let clock = Arc::new(Clock::new());
//! let b = Behavior::new("b", clock.clone(), 1i32);
//! let s = EventStream::new("s", clock);
//! let link = Link::new("b->s", vec![b.clone()], vec![s.clone()], default_link_fn).unwrap();
//! netref.add_links(vec![link]).unwrap();
//! netref.push(b, Occurrence::value(2i32)).unwrap();
//! ```

pub mod combinators;
pub mod engine;
pub mod error;
pub mod link;
pub mod netref;
pub mod network;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use engine::Stimulus;
pub use error::{LinkException, NetworkError};
pub use link::{default_link_fn, Link, LinkExecutor, LinkResult, ThreadExecutor};
pub use netref::{reset_network, set_current, with_netref, NetworkRef};
pub use network::{LinkId, Network, NetworkConfig, ReactiveId};
pub use reactive::{Behavior, EventStream, FnBehavior, Reactive, ReactiveRef, SeqStream};
pub use scheduler::{Scheduler, Task, ThreadScheduler};
pub use value::{downcast, Clock, Occurrence, Rvt, Timestamp, Value};
