//! Generic platform events.
//!
//! Everything the platform reports that is not a chat message (members
//! joining, recalls, the bot going online...) arrives as an [`Event`]. Events
//! are routed purely by name, so callbacks can be registered either with a
//! typed [`EventKind`] or with the raw name string and still end up in the
//! same list.
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! struct MemberJoinEvent { group_id: i64, user_id: i64 }
//!
//! impl EventKind for MemberJoinEvent {}
//!
//! assert_eq!(MemberJoinEvent::event_name(), "MemberJoinEvent");
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed platform event.
///
/// The default event name is the unqualified Rust type name, so the name a
/// typed registration resolves to matches the name the platform sends.
/// Generic arguments are dropped: `Envelope<Notice>` is named `Envelope`.
pub trait EventKind: 'static {
    /// Returns the canonical event name.
    fn event_name() -> &'static str
    where
        Self: Sized,
    {
        let full = std::any::type_name::<Self>();
        let path = full.split('<').next().unwrap_or(full);
        path.rsplit("::").next().unwrap_or(path)
    }
}

/// An inbound platform event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name used for routing.
    pub name: String,
    /// Event-specific data.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub time: i64,
}

impl Event {
    /// Creates an event with the given name and payload.
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            time: 0,
        }
    }

    /// Serializes a typed event into a routable [`Event`].
    pub fn from_kind<T>(event: &T) -> Result<Self, serde_json::Error>
    where
        T: EventKind + Serialize,
    {
        Ok(Self::new(T::event_name(), serde_json::to_value(event)?))
    }

    /// Sets the timestamp.
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    /// Returns `true` if this event carries the name of `T`.
    pub fn is<T: EventKind>(&self) -> bool {
        self.name == T::event_name()
    }

    /// Deserializes the payload back into a typed event.
    ///
    /// Returns `None` when the name does not match `T` or the payload has a
    /// different shape.
    pub fn extract<T>(&self) -> Option<T>
    where
        T: EventKind + DeserializeOwned,
    {
        if !self.is::<T>() {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}
