//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact that happened to an aggregate. Named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Event name used for storage and filtering.
    fn event_type(&self) -> &'static str;

    /// Business time of the event; becomes the envelope's record time.
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// An event-sourced consistency boundary.
///
/// Aggregates are rebuilt by replaying their events, decide new events from
/// commands, and apply events without side effects.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    /// Aggregate name used for event store organization.
    fn aggregate_type() -> &'static str;

    /// `None` for an aggregate with no events yet.
    fn id(&self) -> Option<AggregateId>;

    /// Version 0 for a new aggregate, incremented with each event.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Applies an event. Must be deterministic and must not fail.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
