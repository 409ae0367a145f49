// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use tessera_backend::MemberId;

use super::{ProcessorId, ReplySink};
use crate::messages::ReplyBody;

/// Process-scoped table of in-flight operations keyed by [`ProcessorId`].
///
/// One registry exists per member process. It is created together with the member and
/// torn down by [`ReplyRegistry::shutdown`], which also wakes every waiting operation.
/// Entries are added when a coordinator opens and removed when it completes, is cancelled
/// or is dropped; replies for ids that are no longer registered are dropped.
pub struct ReplyRegistry {
    next_id: AtomicI32,
    processors: DashMap<ProcessorId, Arc<dyn ReplySink>>,
    shutdown: CancellationToken,
    ack_wait_threshold: Option<Duration>,
}

impl ReplyRegistry {
    pub fn new(shutdown: CancellationToken) -> Arc<Self> {
        Self::with_ack_wait_threshold(shutdown, None)
    }

    /// Waits that exceed `threshold` log one warning naming the members still outstanding.
    pub fn with_ack_wait_threshold(
        shutdown: CancellationToken,
        threshold: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(1),
            processors: DashMap::new(),
            shutdown,
            ack_wait_threshold: threshold,
        })
    }

    /// Register `sink` under a fresh id. Ids are positive, wrap at `i32::MAX`, and never
    /// collide with an id that is still registered.
    pub(crate) fn register(&self, sink: Arc<dyn ReplySink>) -> ProcessorId {
        loop {
            let id = self.allocate_id();
            if let Entry::Vacant(vacant) = self.processors.entry(id) {
                vacant.insert(sink);
                trace!(processor_id = %id, "registered reply processor");
                return id;
            }
        }
    }

    fn allocate_id(&self) -> ProcessorId {
        let raw = self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current >= i32::MAX { 1 } else { current + 1 })
            })
            .unwrap_or(1);
        ProcessorId::new(raw.max(1))
    }

    pub(crate) fn remove(&self, processor_id: ProcessorId) {
        if self.processors.remove(&processor_id).is_some() {
            trace!(%processor_id, "removed reply processor");
        }
    }

    fn lookup(&self, processor_id: ProcessorId) -> Option<Arc<dyn ReplySink>> {
        self.processors.get(&processor_id).map(|entry| entry.clone())
    }

    /// Route a reply to its operation. Returns `false` when the operation is gone.
    pub fn deliver(&self, processor_id: ProcessorId, sender: MemberId, body: ReplyBody) -> bool {
        match self.lookup(processor_id) {
            Some(sink) => {
                sink.on_reply(sender, body);
                true
            }
            None => {
                debug!(%processor_id, %sender, "dropping reply for completed operation");
                false
            }
        }
    }

    /// Tell one operation that `member` will not answer it.
    pub fn deliver_departure(&self, processor_id: ProcessorId, member: MemberId) -> bool {
        match self.lookup(processor_id) {
            Some(sink) => {
                sink.on_departure(member);
                true
            }
            None => false,
        }
    }

    /// Tell every in-flight operation that `member` has left the cluster.
    pub fn member_departed(&self, member: MemberId) {
        let sinks: Vec<Arc<dyn ReplySink>> = self
            .processors
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        debug!(%member, in_flight = sinks.len(), "member departed");
        for sink in sinks {
            sink.on_departure(member);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.processors.len()
    }

    pub fn ack_wait_threshold(&self) -> Option<Duration> {
        self.ack_wait_threshold
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every wait and forget all in-flight operations.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.processors.clear();
    }
}

impl fmt::Debug for ReplyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyRegistry")
            .field("in_flight", &self.in_flight())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
