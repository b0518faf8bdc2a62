//! Core event types
//!
//! Anything dispatched through the bus implements [`BusEvent`]: a stable
//! type tag for routing plus an optional event name. Routing keys on the
//! declared tag string, never on runtime type identity, so two event
//! types that should share a channel can share a tag.

use std::any::Any;
use std::sync::Arc;

/// Capability for values dispatched through the bus
pub trait BusEvent: Any + Send + Sync {
    /// Stable routing tag. Every dispatch and registration that should
    /// meet on the same channel must use the same tag.
    fn type_tag(&self) -> &str;

    /// Optional event name, matched against name-based subscriptions
    fn event_name(&self) -> Option<&str> {
        None
    }
}

impl dyn BusEvent {
    /// Downcast to a concrete event type
    pub fn downcast_ref<T: BusEvent>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref::<T>()
    }

    /// Whether this event is a `T`
    pub fn is<T: BusEvent>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

/// Handler invoked with each matching event
pub type EventHandler = Arc<dyn Fn(Arc<dyn BusEvent>) + Send + Sync>;

/// Generic tagged envelope for callers that don't want a dedicated
/// event type
#[derive(Debug, Clone)]
pub struct DataEvent<T> {
    tag: String,
    name: Option<String>,
    /// Event payload
    pub data: Option<T>,
}

impl<T> DataEvent<T> {
    /// An envelope with a tag and a name
    pub fn named(tag: impl Into<String>, name: impl Into<String>, data: T) -> Self {
        Self {
            tag: tag.into(),
            name: Some(name.into()),
            data: Some(data),
        }
    }

    /// An envelope with a tag only
    pub fn tagged(tag: impl Into<String>, data: T) -> Self {
        Self {
            tag: tag.into(),
            name: None,
            data: Some(data),
        }
    }
}

impl<T: Send + Sync + 'static> BusEvent for DataEvent<T> {
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn event_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
