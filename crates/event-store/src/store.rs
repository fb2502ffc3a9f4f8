use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// The version a writer expects the stream to be at before its append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The stream must be exactly at this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// Expectation matching an aggregate loaded at `version`.
    pub fn from_loaded(version: Version) -> Self {
        if version == Version::initial() {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    pub fn as_version(&self) -> Version {
        match self {
            ExpectedVersion::NoStream => Version::initial(),
            ExpectedVersion::Exact(v) => *v,
        }
    }
}

/// Storage for aggregate event streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for one aggregate.
    ///
    /// The batch is written atomically. If the stream is not at `expected`,
    /// nothing is written and `ConcurrencyConflict` is returned.
    /// Returns the version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, expected: ExpectedVersion)
    -> Result<Version>;

    /// Returns all events of an aggregate in version order.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Returns every event of a given type in the order they were recorded.
    async fn events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Current version of an aggregate, `None` if it has no events.
    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Checks that a batch targets one aggregate with consecutive versions
/// starting right after `expected`.
pub(crate) fn validate_batch(events: &[EventEnvelope], expected: ExpectedVersion) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidBatch(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut version = expected.as_version();
    for event in events {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidBatch(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        version = version.next();
        if event.version != version {
            return Err(EventStoreError::InvalidBatch(format!(
                "expected version {version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
