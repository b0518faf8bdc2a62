//! The event bus engine
//!
//! Routes events to subscribers by group key — a string derived from a
//! per-bus prefix plus the event's type tag and/or name — and records
//! every dispatched event in a sticky store so late subscribers can be
//! caught up on registration.

use crate::collections::{SafeList, SafeMap};
use crate::config::BusConfig;
use crate::dispose::{CompositeDisposeToken, Dispose, DisposeToken, Owner, OwnerInner};
use crate::error::{BusError, Result};
use crate::event::{BusEvent, EventHandler};
use crate::lock::LockStrategy;
use crate::queue::TaskQueue;
use crate::subscriber::{Subscriber, SubscriberBuilder};
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

/// Group key used when neither a tag nor a name was supplied
const MISSING_KEY: &str = "must.provide.a.tag.or.a.name";

static DEFAULT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Registry and sticky store, shared behind an `Arc` so deferred work
/// (queued dispatches, token removal callbacks) can reference them
/// without keeping the whole bus alive.
pub(crate) struct BusCore {
    prefix: String,
    label: String,
    lock_strategy: LockStrategy,
    subscribers: SafeMap<String, Arc<SafeList<Arc<Subscriber>>>>,
    sticky: SafeMap<String, Arc<SafeList<Arc<dyn BusEvent>>>>,
}

impl BusCore {
    /// Derive the group key for a (tag, name) combination
    ///
    /// Identical combinations always produce identical keys on the same
    /// bus; the prefix keeps keys from colliding across bus instances, and
    /// the `of` marker keeps a tag-only key distinct from a name-only key
    /// spelled the same way.
    fn group_key(&self, tag: Option<&str>, name: Option<&str>) -> String {
        match (tag, name) {
            (Some(tag), Some(name)) => format!("{}__{}__of__{}", self.prefix, name, tag),
            (None, Some(name)) => format!("{}__{}", self.prefix, name),
            (Some(tag), None) => format!("{}__of__{}", self.prefix, tag),
            (None, None) => MISSING_KEY.to_string(),
        }
    }

    /// Keys a dispatch fans out to: name-only and tag+name when an
    /// effective name is present (the explicit argument wins over the
    /// event's own name), and always tag-only.
    fn dispatch_keys(&self, event: &dyn BusEvent, name: Option<&str>) -> Vec<String> {
        let tag = event.type_tag();
        let mut keys = Vec::with_capacity(3);
        if let Some(name) = name.or_else(|| event.event_name()) {
            keys.push(self.group_key(None, Some(name)));
            keys.push(self.group_key(Some(tag), Some(name)));
        }
        keys.push(self.group_key(Some(tag), None));
        keys
    }

    fn save_sticky(&self, keys: &[String], event: &Arc<dyn BusEvent>) {
        for key in keys {
            let entries = self.sticky.get_or_insert_with(key.clone(), || {
                Arc::new(SafeList::with_strategy(self.lock_strategy, &self.label))
            });
            entries.append(event.clone());
        }
    }

    /// Invoke every subscriber currently registered under `key`
    ///
    /// The list is snapshotted first: handlers never run under the
    /// registry lock, and a token disposed while a dispatch is in flight
    /// may still receive that delivery (best-effort, matching the
    /// documented race).
    fn publish_key(&self, key: &str, event: &Arc<dyn BusEvent>) {
        let Some(list) = self.subscribers.get(key) else {
            return;
        };
        for subscriber in list.snapshot() {
            self.publish_to(&subscriber, event);
        }
    }

    fn publish_to(&self, subscriber: &Arc<Subscriber>, event: &Arc<dyn BusEvent>) {
        match &subscriber.queue {
            Some(queue) => {
                let handler = subscriber.handler.clone();
                let event = event.clone();
                if let Err(error) = queue.enqueue(move || handler(event)) {
                    tracing::error!(
                        %error,
                        subscriber = %subscriber.unique_id,
                        "Delivery dropped: subscriber queue terminated"
                    );
                }
            }
            None => (subscriber.handler)(event.clone()),
        }
    }

    /// Replay previously stored events for `key` to one subscriber, in
    /// original dispatch order
    fn replay_sticky_to(&self, key: &str, subscriber: &Arc<Subscriber>) {
        let Some(entries) = self.sticky.get(key) else {
            return;
        };
        for event in entries.snapshot() {
            self.publish_to(subscriber, &event);
        }
    }
}

/// Dispatch an event on a core: record sticky entries for every key
/// (before any handler runs), publish to each key's subscribers, and
/// bind per-key sticky-cleanup tokens into the owner's sticky bag.
fn dispatch_on(
    core: &Arc<BusCore>,
    event: &Arc<dyn BusEvent>,
    name: Option<&str>,
    owner: Option<&OwnerInner>,
) {
    let keys = core.dispatch_keys(event.as_ref(), name);
    core.save_sticky(&keys, event);

    for key in &keys {
        core.publish_key(key, event);

        if let Some(owner) = owner {
            let weak_core = Arc::downgrade(core);
            let token = DisposeToken::new(key.clone(), move |key: &str| {
                if let Some(core) = weak_core.upgrade() {
                    core.sticky.remove(key);
                    tracing::debug!(key, "Sticky entries removed");
                }
            });
            owner.sticky_bag.add_sticky_token(Arc::new(token));
        }
    }

    tracing::trace!(
        tag = event.type_tag(),
        keys = keys.len(),
        "Event dispatched"
    );
}

/// In-process publish/subscribe event bus with sticky replay
///
/// Each bus is an explicit instance; producers and consumers share one by
/// reference or through the explicitly installed process-wide default
/// ([`EventBus::init_default`]).
pub struct EventBus {
    core: Arc<BusCore>,
    publish_queue: TaskQueue,
    main_queue: Arc<TaskQueue>,
    config: BusConfig,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default configuration
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with an explicit configuration
    pub fn with_config(config: BusConfig) -> Self {
        let core = Arc::new(BusCore {
            prefix: format!("bus-{}", Uuid::new_v4()),
            label: config.label.clone(),
            lock_strategy: config.lock_strategy,
            subscribers: SafeMap::with_strategy(
                config.lock_strategy,
                &format!("{}.subscribers", config.label),
            ),
            sticky: SafeMap::with_strategy(
                config.lock_strategy,
                &format!("{}.sticky", config.label),
            ),
        });
        let publish_queue = TaskQueue::new(format!("{}.publish", config.label));
        let main_queue = Arc::new(TaskQueue::new(format!("{}.main", config.label)));

        tracing::debug!(label = %config.label, strategy = ?config.lock_strategy, "Bus created");
        Self {
            core,
            publish_queue,
            main_queue,
            config,
        }
    }

    /// Install the process-wide default bus
    ///
    /// Fails if a default was already installed. There is no implicit
    /// construction: until this is called, [`default_instance`] returns
    /// `None`.
    ///
    /// [`default_instance`]: Self::default_instance
    pub fn init_default(config: BusConfig) -> Result<()> {
        let label = config.label.clone();
        DEFAULT_BUS
            .set(Self::with_config(config))
            .map_err(|_| BusError::DefaultAlreadyInstalled(label))
    }

    /// The installed process-wide default bus, if any
    pub fn default_instance() -> Option<&'static EventBus> {
        DEFAULT_BUS.get()
    }

    /// This bus's configuration
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The bus's designated main queue — the execution context
    /// [`dispatch_sync`](Self::dispatch_sync) targets
    pub fn main_queue(&self) -> &Arc<TaskQueue> {
        &self.main_queue
    }

    // ─── Registration ────────────────────────────────────────────

    /// Start a registration for events carrying `type_tag`
    pub fn on(&self, type_tag: impl Into<String>) -> SubscriberBuilder<'_> {
        SubscriberBuilder::new(self, Some(type_tag.into()))
    }

    /// Start a registration with no tag filter (name-only subscription)
    pub fn on_any(&self) -> SubscriberBuilder<'_> {
        SubscriberBuilder::new(self, None)
    }

    /// Subscribe to every event carrying `type_tag`; disposal follows the
    /// owner's lifetime
    pub fn subscribe(
        &self,
        type_tag: impl Into<String>,
        owner: &Owner,
        handler: impl Fn(Arc<dyn BusEvent>) + Send + Sync + 'static,
    ) -> Option<Arc<dyn Dispose>> {
        self.on(type_tag).owned_by(owner).next(handler)
    }

    /// Subscribe to `type_tag` under specific name sub-keys
    pub fn subscribe_keys<I>(
        &self,
        type_tag: impl Into<String>,
        keys: I,
        owner: &Owner,
        handler: impl Fn(Arc<dyn BusEvent>) + Send + Sync + 'static,
    ) -> Option<Arc<dyn Dispose>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.on(type_tag).with_keys(keys).owned_by(owner).next(handler)
    }

    /// Name-only subscription: no tag filter, one registration per key
    pub fn subscribe_names<I>(
        &self,
        keys: I,
        owner: &Owner,
        handler: impl Fn(Arc<dyn BusEvent>) + Send + Sync + 'static,
    ) -> Option<Arc<dyn Dispose>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.on_any().with_keys(keys).owned_by(owner).next(handler)
    }

    /// Finalize a builder: register once under (tag, no name) when no
    /// sub-keys were declared, otherwise once per sub-key behind a
    /// composite token.
    ///
    /// A builder without a handler registers nothing and yields no token
    /// — long-standing observable behavior, kept and logged.
    pub(crate) fn create_subscriber(
        &self,
        maker: SubscriberBuilder<'_>,
    ) -> Option<Arc<dyn Dispose>> {
        let Some(handler) = maker.handler.clone() else {
            tracing::warn!(
                label = %self.config.label,
                "Registration finalized without a handler; nothing registered"
            );
            return None;
        };

        if maker.sub_keys.is_empty() {
            return Some(self.add_subscriber(&maker, handler, None));
        }

        let tokens: SafeList<Arc<dyn Dispose>> = SafeList::new();
        for key in &maker.sub_keys {
            tokens.append(self.add_subscriber(&maker, handler.clone(), Some(key.as_str())));
        }
        Some(Arc::new(CompositeDisposeToken::new(tokens)))
    }

    /// Register one subscriber under the key derived from the builder's
    /// tag and `event_name`, wire its removal token, bind the token to
    /// the owner, then replay stored sticky events to it.
    fn add_subscriber(
        &self,
        maker: &SubscriberBuilder<'_>,
        handler: EventHandler,
        event_name: Option<&str>,
    ) -> Arc<dyn Dispose> {
        let core = &self.core;
        let group_key = core.group_key(maker.type_tag.as_deref(), event_name);
        let unique_id = format!("{}__{}", group_key, Uuid::new_v4());

        // Removal captures the core weakly, like any other deferred work:
        // a retained token must not keep a dropped bus's registry alive.
        let weak_core: Weak<BusCore> = Arc::downgrade(core);
        let removal_key = group_key.clone();
        let token: Arc<dyn Dispose> = Arc::new(DisposeToken::new(
            unique_id.clone(),
            move |unique_id: &str| {
                if let Some(core) = weak_core.upgrade() {
                    if let Some(list) = core.subscribers.get(&removal_key) {
                        list.remove_where(|s| s.unique_id == unique_id);
                    }
                    tracing::debug!(subscriber = unique_id, key = %removal_key, "Subscriber removed");
                }
            },
        ));

        if let Some(owner) = maker.owner {
            owner.inner_ref().bag.add_token(token.clone());
        }

        let subscriber = Arc::new(Subscriber {
            unique_id: unique_id.clone(),
            type_tag: maker.type_tag.clone(),
            queue: maker.queue.clone(),
            handler,
        });

        let list = core.subscribers.get_or_insert_with(group_key.clone(), || {
            Arc::new(SafeList::with_strategy(core.lock_strategy, &core.label))
        });
        list.append(subscriber.clone());
        tracing::debug!(subscriber = %unique_id, key = %group_key, "Subscriber registered");

        core.replay_sticky_to(&group_key, &subscriber);
        token
    }

    // ─── Dispatch ────────────────────────────────────────────────

    /// Publish `event` to every matching subscriber, inline on the
    /// calling thread (except subscribers with their own queue)
    ///
    /// The event is recorded into the sticky store for every computed key
    /// before any handler runs. When `owner` is supplied, the sticky
    /// entries are removed again when the owner goes away.
    pub fn dispatch(&self, event: Arc<dyn BusEvent>, name: Option<&str>, owner: Option<&Owner>) {
        dispatch_on(&self.core, &event, name, owner.map(Owner::inner_ref));
    }

    /// Publish `event` from the bus's background publish queue
    ///
    /// Ordering across separate `dispatch_async` calls is not guaranteed.
    pub fn dispatch_async(
        &self,
        event: Arc<dyn BusEvent>,
        name: Option<&str>,
        owner: Option<&Owner>,
    ) {
        let core = self.core.clone();
        let name = name.map(str::to_string);
        let owner = owner.map(Owner::downgrade);
        let outcome = self.publish_queue.enqueue(move || {
            let owner = owner.as_ref().and_then(Weak::upgrade);
            dispatch_on(&core, &event, name.as_deref(), owner.as_deref());
        });
        if let Err(error) = outcome {
            tracing::error!(%error, "dispatch_async dropped: publish queue terminated");
        }
    }

    /// Publish `event` on the bus's main queue
    ///
    /// Inline when already on the main queue's thread. Off that thread the
    /// dispatch is *scheduled, not awaited* — despite the name, this call
    /// does not block the caller. Historical behavior, kept deliberately.
    pub fn dispatch_sync(&self, event: Arc<dyn BusEvent>, name: Option<&str>) {
        if self.main_queue.is_current() {
            dispatch_on(&self.core, &event, name, None);
            return;
        }
        let core = self.core.clone();
        let name = name.map(str::to_string);
        let outcome = self
            .main_queue
            .enqueue(move || dispatch_on(&core, &event, name.as_deref(), None));
        if let Err(error) = outcome {
            tracing::error!(%error, "dispatch_sync dropped: main queue terminated");
        }
    }
}
