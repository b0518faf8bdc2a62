//! Subscription disposal
//!
//! A subscription has exactly two states, active and disposed, with a
//! single one-way transition. [`DisposeToken`] is the handle for one
//! registration; [`CompositeDisposeToken`] fans disposal out to several;
//! [`DisposeBag`] collects tokens so they can be torn down together; an
//! [`Owner`] holds the bags and ties them to a caller-controlled lifetime.

use crate::collections::SafeList;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Anything that can tear down a subscription
pub trait Dispose: Send + Sync {
    /// Dispose the subscription. Idempotent: the second and later calls
    /// are no-ops.
    fn dispose(&self);
}

type RemovalFn = Box<dyn FnOnce(&str) + Send>;

struct TokenState {
    disposed: bool,
    on_dispose: Option<RemovalFn>,
}

/// Handle for one active registration
///
/// Disposal is the sole removal mechanism: the removal callback runs
/// exactly once, after which the token is inert.
pub struct DisposeToken {
    unique_id: String,
    state: Mutex<TokenState>,
}

impl DisposeToken {
    pub fn new(unique_id: impl Into<String>, on_dispose: impl FnOnce(&str) + Send + 'static) -> Self {
        Self {
            unique_id: unique_id.into(),
            state: Mutex::new(TokenState {
                disposed: false,
                on_dispose: Some(Box::new(on_dispose)),
            }),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl Dispose for DisposeToken {
    fn dispose(&self) {
        let callback = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.on_dispose.take()
        };
        // The callback runs outside the state lock.
        if let Some(callback) = callback {
            tracing::debug!(token = %self.unique_id, "Token disposed");
            callback(&self.unique_id);
        }
    }
}

/// A token owning child tokens, all disposed together
///
/// Each child independently enforces its own idempotence, so children
/// disposed individually beforehand are skipped harmlessly.
pub struct CompositeDisposeToken {
    disposed: AtomicBool,
    children: SafeList<Arc<dyn Dispose>>,
}

impl CompositeDisposeToken {
    pub fn new(children: SafeList<Arc<dyn Dispose>>) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            children,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Dispose for CompositeDisposeToken {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.children.for_each(|child| child.dispose());
    }
}

/// Owner-scoped token storage with two pools: general subscriptions and
/// sticky-dispatch cleanup tokens. Both are torn down together when the
/// bag goes away, but tracked separately.
#[derive(Default)]
pub struct DisposeBag {
    tokens: SafeList<Arc<dyn Dispose>>,
    sticky_tokens: SafeList<Arc<dyn Dispose>>,
}

impl DisposeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&self, token: Arc<dyn Dispose>) {
        self.tokens.append(token);
    }

    pub fn add_sticky_token(&self, token: Arc<dyn Dispose>) {
        self.sticky_tokens.append(token);
    }

    pub fn token_count(&self) -> usize {
        self.tokens.count()
    }

    pub fn sticky_token_count(&self) -> usize {
        self.sticky_tokens.count()
    }

    /// Dispose every token in both pools
    pub fn dispose_all(&self) {
        self.tokens.for_each(|token| token.dispose());
        self.sticky_tokens.for_each(|token| token.dispose());
    }
}

impl Drop for DisposeBag {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

pub(crate) struct OwnerInner {
    pub(crate) bag: DisposeBag,
    pub(crate) sticky_bag: DisposeBag,
}

/// Explicit subscription-owner handle
///
/// Registrations bound to an owner are disposed when the owner is closed
/// or dropped; sticky entries recorded on the owner's behalf are removed
/// at the same time. One bag holds subscription tokens, a second holds
/// sticky-cleanup tokens, so the two can be reasoned about independently.
pub struct Owner {
    inner: Arc<OwnerInner>,
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl Owner {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OwnerInner {
                bag: DisposeBag::new(),
                sticky_bag: DisposeBag::new(),
            }),
        }
    }

    /// Tear down both bags now instead of waiting for drop
    pub fn close(self) {
        drop(self);
    }

    /// Number of live subscription tokens bound to this owner
    pub fn subscription_count(&self) -> usize {
        self.inner.bag.token_count()
    }

    pub(crate) fn inner_ref(&self) -> &OwnerInner {
        &self.inner
    }

    // Deferred dispatches hold the owner weakly: a queued job must not
    // delay the owner's drop-time cleanup.
    pub(crate) fn downgrade(&self) -> Weak<OwnerInner> {
        Arc::downgrade(&self.inner)
    }
}
