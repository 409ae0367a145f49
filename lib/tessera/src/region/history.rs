// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use dashmap::DashMap;

use crate::version::{EventId, VersionTag};

/// Per-region ledger of version tags recorded for client events.
///
/// Single-entry operations and bulk operations are tracked separately; a bulk operation
/// records one tag for the whole batch under the event id of the originating request.
#[derive(Debug, Default)]
pub struct EventHistory {
    client_events: DashMap<EventId, VersionTag>,
    bulk_ops: DashMap<EventId, VersionTag>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tag applied for a single-entry client event. A later record for the same
    /// event replaces the earlier one.
    pub fn record_client_event(&self, event_id: EventId, tag: VersionTag) {
        self.client_events.insert(event_id, tag);
    }

    pub fn record_client_bulk_op(&self, event_id: EventId, tag: VersionTag) {
        self.bulk_ops.insert(event_id, tag);
    }

    pub fn find_client_event(&self, event_id: &EventId) -> Option<VersionTag> {
        self.client_events.get(event_id).map(|tag| tag.clone())
    }

    pub fn find_client_bulk_op(&self, event_id: &EventId) -> Option<VersionTag> {
        self.bulk_ops.get(event_id).map(|tag| tag.clone())
    }

    pub fn len(&self) -> usize {
        self.client_events.len() + self.bulk_ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
