//! Append-only event journal.
//!
//! Every order status transition is stored as one event. Appends carry the
//! version the writer last saw, so two writers racing on the same order
//! cannot both succeed.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, ExpectedVersion};
