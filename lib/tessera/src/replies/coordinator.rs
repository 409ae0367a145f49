// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use tessera_backend::MemberId;

use super::{ProcessorId, ReplyAggregator, ReplyRegistry, ReplySink};
use crate::messages::ReplyBody;

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// The aggregator needed no further replies.
    Satisfied(T),
    /// Every recipient replied or departed without satisfying the aggregator.
    Exhausted(T),
    /// The caller cancelled the wait; the result is undetermined.
    Interrupted,
    /// The member is shutting down; the result is treated as empty.
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Satisfied,
    Cancelled,
}

struct AggregationState<A> {
    outstanding: HashSet<MemberId>,
    aggregator: A,
    phase: Phase,
}

impl<A: ReplyAggregator> AggregationState<A> {
    fn is_complete(&self) -> bool {
        self.phase != Phase::Waiting || self.outstanding.is_empty()
    }
}

/// One in-flight operation: explicit state behind a single lock, plus a wake-up signal for
/// the waiting task.
struct Aggregation<A> {
    processor_id: ProcessorId,
    state: Mutex<AggregationState<A>>,
    notify: Notify,
}

impl<A: ReplyAggregator> Aggregation<A> {
    fn apply_reply(&self, sender: MemberId, body: ReplyBody) {
        let mut state = self.state.lock();
        if state.phase != Phase::Waiting {
            trace!(processor_id = %self.processor_id, %sender, "reply after completion ignored");
            return;
        }
        if !state.outstanding.remove(&sender) {
            debug!(processor_id = %self.processor_id, %sender, "ignoring reply from member not outstanding");
            return;
        }
        if state.aggregator.accept(sender, body) {
            state.phase = Phase::Satisfied;
        }
        let complete = state.is_complete();
        drop(state);

        if complete {
            self.notify.notify_one();
        }
    }

    fn apply_departure(&self, member: MemberId) {
        let mut state = self.state.lock();
        if state.phase != Phase::Waiting || !state.outstanding.remove(&member) {
            return;
        }
        debug!(processor_id = %self.processor_id, %member, "outstanding member departed");
        let complete = state.is_complete();
        drop(state);

        if complete {
            self.notify.notify_one();
        }
    }

    fn try_complete(&self) -> Option<WaitOutcome<A::Output>> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Satisfied => Some(WaitOutcome::Satisfied(state.aggregator.take_result())),
            Phase::Waiting if state.outstanding.is_empty() => {
                state.phase = Phase::Cancelled;
                Some(WaitOutcome::Exhausted(state.aggregator.take_result()))
            }
            Phase::Waiting => None,
            Phase::Cancelled => Some(WaitOutcome::Interrupted),
        }
    }

    fn cancel(&self) {
        self.state.lock().phase = Phase::Cancelled;
    }

    fn outstanding(&self) -> Vec<MemberId> {
        self.state.lock().outstanding.iter().copied().collect()
    }
}

/// Handle to an in-flight scatter/gather operation.
///
/// Dropping the handle removes the operation from the registry; replies that arrive later
/// are discarded.
pub struct ReplyCoordinator<A: ReplyAggregator> {
    processor_id: ProcessorId,
    registry: Arc<ReplyRegistry>,
    aggregation: Arc<Aggregation<A>>,
}

impl<A: ReplyAggregator> ReplyCoordinator<A> {
    /// Register a new operation waiting on every member of `recipients`.
    pub fn open(
        registry: &Arc<ReplyRegistry>,
        recipients: impl IntoIterator<Item = MemberId>,
        aggregator: A,
    ) -> Self {
        let state = AggregationState {
            outstanding: recipients.into_iter().collect(),
            aggregator,
            phase: Phase::Waiting,
        };

        let cell = Arc::new(SinkCell::<A>::default());
        let processor_id = registry.register(cell.clone());
        let aggregation = Arc::new(Aggregation {
            processor_id,
            state: Mutex::new(state),
            notify: Notify::new(),
        });
        cell.set(aggregation.clone());

        Self {
            processor_id,
            registry: registry.clone(),
            aggregation,
        }
    }

    pub fn processor_id(&self) -> ProcessorId {
        self.processor_id
    }

    /// Members that have neither replied nor departed.
    pub fn outstanding(&self) -> Vec<MemberId> {
        self.aggregation.outstanding()
    }

    pub fn on_reply(&self, sender: MemberId, body: ReplyBody) {
        self.aggregation.apply_reply(sender, body);
    }

    /// Stop waiting for `member`, as if it had replied with nothing.
    pub fn member_departed(&self, member: MemberId) {
        self.aggregation.apply_departure(member);
    }

    /// Wait until the operation is satisfied, exhausted, interrupted or the member shuts down.
    ///
    /// Cancelling `interrupt` ends the wait with [`WaitOutcome::Interrupted`]. The token is
    /// left cancelled so the caller can observe the interruption.
    pub async fn wait(self, interrupt: &CancellationToken) -> WaitOutcome<A::Output> {
        if self.registry.is_shutting_down() {
            self.aggregation.cancel();
            return WaitOutcome::ShuttingDown;
        }
        if interrupt.is_cancelled() {
            self.aggregation.cancel();
            return WaitOutcome::Interrupted;
        }

        let shutdown = self.registry.shutdown_token().clone();
        let warn_at = self
            .registry
            .ack_wait_threshold()
            .map(|threshold| Instant::now() + threshold);
        let mut warned = false;

        loop {
            if let Some(outcome) = self.aggregation.try_complete() {
                return outcome;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.aggregation.cancel();
                    debug!(processor_id = %self.processor_id, "wait abandoned: member shutting down");
                    return WaitOutcome::ShuttingDown;
                }
                _ = interrupt.cancelled() => {
                    self.aggregation.cancel();
                    debug!(processor_id = %self.processor_id, "wait interrupted");
                    return WaitOutcome::Interrupted;
                }
                _ = self.aggregation.notify.notified() => {}
                _ = tokio::time::sleep_until(warn_at.unwrap_or_else(Instant::now)), if warn_at.is_some() && !warned => {
                    warned = true;
                    warn!(
                        processor_id = %self.processor_id,
                        outstanding = ?self.outstanding(),
                        "still waiting for replies past the ack-wait threshold"
                    );
                }
            }
        }
    }

    /// Abandon the operation without waiting.
    pub fn cancel(self) {
        self.aggregation.cancel();
    }
}

impl<A: ReplyAggregator> Drop for ReplyCoordinator<A> {
    fn drop(&mut self) {
        self.registry.remove(self.processor_id);
    }
}

impl<A: ReplyAggregator> fmt::Debug for ReplyCoordinator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyCoordinator")
            .field("processor_id", &self.processor_id)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Registry entry for an aggregation; filled once the processor id is known.
struct SinkCell<A> {
    inner: OnceLock<Arc<Aggregation<A>>>,
}

impl<A> Default for SinkCell<A> {
    fn default() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }
}

impl<A> SinkCell<A> {
    fn set(&self, aggregation: Arc<Aggregation<A>>) {
        let _ = self.inner.set(aggregation);
    }
}

impl<A: ReplyAggregator> ReplySink for SinkCell<A> {
    fn on_reply(&self, sender: MemberId, body: ReplyBody) {
        if let Some(aggregation) = self.inner.get() {
            aggregation.apply_reply(sender, body);
        }
    }

    fn on_departure(&self, member: MemberId) {
        if let Some(aggregation) = self.inner.get() {
            aggregation.apply_departure(member);
        }
    }
}
