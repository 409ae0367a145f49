// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::fmt;

/// Globally unique identity of an originating client operation.
///
/// An event is identified by its producer (an opaque membership identity of the client
/// connection that issued it), the producer's thread and a per-thread sequence number.
/// Equality and hashing are structural.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EventId {
    producer: Bytes,
    thread_id: i64,
    sequence_id: i64,
}

impl EventId {
    pub fn new(producer: impl Into<Bytes>, thread_id: i64, sequence_id: i64) -> Self {
        Self {
            producer: producer.into(),
            thread_id,
            sequence_id,
        }
    }

    pub fn producer(&self) -> &Bytes {
        &self.producer
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn sequence_id(&self) -> i64 {
        self.sequence_id
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId[id=")?;
        for byte in self.producer.iter() {
            write!(f, "{byte:02x}")?;
        }
        write!(
            f,
            ";threadID={};sequenceID={}]",
            self.thread_id, self.sequence_id
        )
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
