//! # replaybus
//!
//! In-process publish/subscribe event bus with sticky replay,
//! owner-scoped disposal, and pluggable lock strategies.
//!
//! ## Overview
//!
//! `replaybus` decouples producers and consumers of application events
//! without a central mediator being passed around. Events route by a
//! declared type tag and/or an event name; every dispatched event is also
//! recorded as a *sticky* entry, so a subscriber registering late is
//! caught up synchronously, in original dispatch order.
//!
//! ## Quick Start
//!
//! ```rust
//! use replaybus::{DataEvent, EventBus, Owner};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let owner = Owner::new();
//!
//! bus.on("order.placed")
//!     .owned_by(&owner)
//!     .next(|event| {
//!         if let Some(order) = event.downcast_ref::<DataEvent<u64>>() {
//!             println!("order #{:?}", order.data);
//!         }
//!     });
//!
//! bus.dispatch(Arc::new(DataEvent::tagged("order.placed", 42u64)), None, Some(&owner));
//!
//! // Dropping (or closing) the owner disposes its subscriptions and
//! // removes the sticky entries recorded on its behalf.
//! owner.close();
//! ```
//!
//! ## Architecture
//!
//! - **[`EventBus`]** — derives group keys, fans dispatches out to
//!   subscribers, records and replays sticky events
//! - **[`SubscriberBuilder`]** — fluent registration: tag, name sub-keys,
//!   delivery queue, owner
//! - **[`Dispose`] / [`DisposeToken`] / [`Owner`]** — idempotent,
//!   lifetime-scoped unsubscription
//! - **[`SafeList`] / [`SafeMap`]** — lock-guarded collections backing the
//!   registry and sticky store
//! - **[`RwStrategy`] / [`LockStrategy`]** — interchangeable read/write
//!   lock implementations selected at construction

pub mod bus;
pub mod collections;
pub mod config;
pub mod dispose;
pub mod error;
pub mod event;
pub mod lock;
pub mod queue;
pub mod subscriber;

// Re-export core types
pub use bus::EventBus;
pub use collections::{SafeList, SafeMap};
pub use config::BusConfig;
pub use dispose::{CompositeDisposeToken, Dispose, DisposeBag, DisposeToken, Owner};
pub use error::{BusError, Result};
pub use event::{BusEvent, DataEvent, EventHandler};
pub use lock::{LockStrategy, RwStrategy};
pub use queue::TaskQueue;
pub use subscriber::{Subscriber, SubscriberBuilder};
