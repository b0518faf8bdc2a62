//! Subscribers and the fluent registration builder

use crate::bus::EventBus;
use crate::dispose::{Dispose, Owner};
use crate::event::{BusEvent, EventHandler};
use crate::queue::TaskQueue;
use std::sync::Arc;

/// One registered subscriber
///
/// Created at registration time, immutable thereafter, removed only via
/// its dispose token.
pub struct Subscriber {
    pub(crate) unique_id: String,
    pub(crate) type_tag: Option<String>,
    pub(crate) queue: Option<Arc<TaskQueue>>,
    pub(crate) handler: EventHandler,
}

impl Subscriber {
    /// Process-unique id, also embedded in the dispose token
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// The tag filter this subscriber registered with, if any
    pub fn type_tag(&self) -> Option<&str> {
        self.type_tag.as_deref()
    }
}

/// Fluent accumulator for one registration
///
/// Obtained from [`EventBus::on`] or [`EventBus::on_any`]; configured with
/// the optional delivery queue, owner, and sub-keys; finalized exactly
/// once by [`next`](Self::next), which consumes the builder.
pub struct SubscriberBuilder<'a> {
    pub(crate) bus: &'a EventBus,
    pub(crate) type_tag: Option<String>,
    pub(crate) queue: Option<Arc<TaskQueue>>,
    pub(crate) owner: Option<&'a Owner>,
    pub(crate) sub_keys: Vec<String>,
    pub(crate) handler: Option<EventHandler>,
}

impl<'a> SubscriberBuilder<'a> {
    pub(crate) fn new(bus: &'a EventBus, type_tag: Option<String>) -> Self {
        Self {
            bus,
            type_tag,
            queue: None,
            owner: None,
            sub_keys: Vec::new(),
            handler: None,
        }
    }

    /// Deliver events to this subscriber on `queue` instead of inline on
    /// the dispatching thread
    pub fn on_queue(mut self, queue: Arc<TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Bind the resulting token(s) into `owner`'s bag so the registration
    /// is disposed with the owner
    pub fn owned_by(mut self, owner: &'a Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Add one name sub-key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.sub_keys.push(key.into());
        self
    }

    /// Add several name sub-keys
    pub fn with_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.sub_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Finalize the registration with `handler`
    ///
    /// Returns the dispose token — a composite when sub-keys were
    /// declared. The token can be ignored when an owner was bound.
    pub fn next(
        mut self,
        handler: impl Fn(Arc<dyn BusEvent>) + Send + Sync + 'static,
    ) -> Option<Arc<dyn Dispose>> {
        self.handler = Some(Arc::new(handler));
        self.finish()
    }

    pub(crate) fn finish(self) -> Option<Arc<dyn Dispose>> {
        self.bus.create_subscriber(self)
    }
}
