//! The per-execution resilience context.

use super::ResilienceProperties;
use crate::cancellation::CancellationToken;
use crate::telemetry::ResilienceEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Number of events a context keeps. Older events are discarded first.
pub const MAX_RETAINED_EVENTS: usize = 256;

/// State owned by one logical pipeline execution.
///
/// Holds the cancellation token observed by every strategy, typed ambient
/// properties, an optional operation key and the resilience events reported
/// so far. A context is exclusively owned by one in-flight execution.
#[derive(Debug)]
pub struct ResilienceContext {
    /// Cancellation observed by the strategies and the callable.
    cancellation: Arc<CancellationToken>,
    /// Ambient properties.
    properties: ResilienceProperties,
    /// Operation key used in telemetry.
    operation_key: Option<String>,
    /// Identifies one acquisition of the context.
    execution_id: Uuid,
    /// The most recent events reported during the execution.
    events: VecDeque<ResilienceEvent>,
    /// Events discarded once the log was full.
    dropped_events: usize,
}

impl ResilienceContext {
    /// Creates a new context with its own cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancellation: Arc::new(CancellationToken::new()),
            properties: ResilienceProperties::new(),
            operation_key: None,
            execution_id: Uuid::new_v4(),
            events: VecDeque::new(),
            dropped_events: 0,
        }
    }

    /// Uses the caller's cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the operation key.
    #[must_use]
    pub fn with_operation_key(mut self, key: impl Into<String>) -> Self {
        self.operation_key = Some(key.into());
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Swaps the cancellation token, returning the previous one.
    pub(crate) fn replace_cancellation(
        &mut self,
        token: Arc<CancellationToken>,
    ) -> Arc<CancellationToken> {
        std::mem::replace(&mut self.cancellation, token)
    }

    /// Returns the properties.
    #[must_use]
    pub fn properties(&self) -> &ResilienceProperties {
        &self.properties
    }

    /// Returns the properties for modification.
    pub fn properties_mut(&mut self) -> &mut ResilienceProperties {
        &mut self.properties
    }

    /// Returns the operation key.
    #[must_use]
    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    /// Sets the operation key.
    pub fn set_operation_key(&mut self, key: Option<String>) {
        self.operation_key = key;
    }

    /// Returns the execution id.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Returns the events reported during this execution, oldest first.
    ///
    /// At most [`MAX_RETAINED_EVENTS`] are kept; see
    /// [`dropped_events`](Self::dropped_events).
    #[must_use]
    pub fn events(&self) -> &VecDeque<ResilienceEvent> {
        &self.events
    }

    /// Returns how many of the oldest events were discarded.
    #[must_use]
    pub fn dropped_events(&self) -> usize {
        self.dropped_events
    }

    pub(crate) fn add_event(&mut self, event: ResilienceEvent) {
        if self.events.len() == MAX_RETAINED_EVENTS {
            self.events.pop_front();
            self.dropped_events += 1;
        }
        self.events.push_back(event);
    }

    /// Creates the context of a hedged attempt: linked token, copied
    /// properties, same operation key and execution id.
    pub(crate) fn fork(&self) -> Self {
        Self {
            cancellation: self.cancellation.child(),
            properties: self.properties.clone(),
            operation_key: self.operation_key.clone(),
            execution_id: self.execution_id,
            events: VecDeque::new(),
            dropped_events: 0,
        }
    }

    /// Takes over the properties and events of a finished hedged attempt.
    pub(crate) fn absorb(&mut self, attempt: Self) {
        self.properties.merge_from(&attempt.properties);
        self.dropped_events += attempt.dropped_events;
        for event in attempt.events {
            self.add_event(event);
        }
    }

    /// Returns the context to its freshly-created state.
    pub(crate) fn reset(&mut self) {
        match Arc::get_mut(&mut self.cancellation) {
            Some(token) => token.reset(),
            None => self.cancellation = Arc::new(CancellationToken::new()),
        }
        self.properties.clear();
        self.operation_key = None;
        self.events.clear();
        self.dropped_events = 0;
        self.execution_id = Uuid::new_v4();
    }
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new()
    }
}
