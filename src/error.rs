use std::fmt;

/// Errors surfaced at the public boundary of the propagation network.
///
/// The propagation engine itself treats [`NetworkError::QueueOverflow`] and
/// [`NetworkError::Completed`] as recoverable control flow (retry / drop,
/// see the `deliver!` stage in the module docs) rather than propagating
/// them to the caller.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// An event stream's bounded queue was full at delivery time.
    #[error("event stream queue overflow (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    /// Delivery was attempted against a reactive that already completed.
    #[error("delivery to a completed reactive was dropped")]
    Completed,

    /// The reactive variant does not support external delivery
    /// (`SeqStream`, `FnBehavior`).
    #[error("delivery is not supported by this reactive variant")]
    Unsupported,

    /// A `Behavior` was delivered to after it stopped being live.
    #[error("behavior is no longer live")]
    InvalidState,

    /// The network ref's worker thread has already shut down.
    #[error("network ref has been disposed")]
    Disposed,

    /// A link was constructed with no input reactives.
    #[error("a link must have at least one input reactive")]
    LinkInputsEmpty,
}

/// A caught panic from a `link_fn`, preserved for an `error_fn` to inspect.
pub struct LinkException {
    message: String,
}

impl LinkException {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "link_fn panicked with a non-string payload".to_string()
        };
        LinkException { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for LinkException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkException")
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for LinkException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link_fn exception: {}", self.message)
    }
}

impl std::error::Error for LinkException {}
