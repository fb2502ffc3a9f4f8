//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, ExpectedVersion, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

/// An intention to change one aggregate. May be rejected by its current state.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Loads aggregates, runs commands against them and appends the results.
///
/// Appends are optimistic. When another writer got there first, the handler
/// reloads the aggregate and asks the command again, so the losing caller
/// sees the command rejected by the winner's state rather than a storage
/// conflict.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning a default instance if it has no events.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let envelopes = self.store.load(aggregate_id).await?;
        Self::replay(envelopes)
    }

    /// Loads an aggregate, returning `None` if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Rebuilds an aggregate from its stored events.
    pub fn replay(envelopes: Vec<EventEnvelope>) -> Result<A, DomainError> {
        let mut aggregate = A::default();
        for envelope in envelopes {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }
        Ok(aggregate)
    }

    /// Executes a command and persists the resulting events.
    ///
    /// `command_fn` receives the current aggregate and returns the events to
    /// append. It may be called more than once if the append races another
    /// writer, so it must not have side effects.
    ///
    /// A lost race is re-decided against the newer state until the append
    /// lands or the command rejects. Every conflict means a rival append
    /// landed, so the stream keeps moving forward.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempt: u32 = 0;
        loop {
            let mut aggregate = self.load(aggregate_id).await?;
            let current_version = aggregate.version();

            let events = command_fn(&aggregate)?;
            if events.is_empty() {
                return Ok(CommandResult {
                    aggregate,
                    events,
                    new_version: current_version,
                });
            }

            let envelopes = Self::build_envelopes(aggregate_id, current_version, &events)?;
            let expected = ExpectedVersion::from_loaded(current_version);

            match self.store.append(envelopes, expected).await {
                Ok(new_version) => {
                    aggregate.apply_events(events.iter().cloned());
                    aggregate.set_version(new_version);
                    return Ok(CommandResult {
                        aggregate,
                        events,
                        new_version,
                    });
                }
                Err(e) if e.is_conflict() => {
                    attempt = attempt.saturating_add(1);
                    tracing::debug!(
                        %aggregate_id,
                        attempt,
                        "append lost a race, re-running command"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn build_envelopes(
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .recorded_at(event.occurred_at())
                .payload(event)?
                .build()?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }
}
