// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scatter/gather reply coordination.
//!
//! An operation that sends one request to many members opens a [`ReplyCoordinator`] over
//! the recipient set. The coordinator registers an aggregation with the member's
//! [`ReplyRegistry`] under a fresh [`ProcessorId`]; the id travels in the request and comes
//! back in every reply, which is how the inbound reply path finds the aggregation again.
//!
//! # Usage Pattern
//!
//! ```ignore
//! let coordinator = ReplyCoordinator::open(&registry, recipients, MyAggregator::default());
//! send_request(coordinator.processor_id());
//! match coordinator.wait(&interrupt).await {
//!     WaitOutcome::Satisfied(result) | WaitOutcome::Exhausted(result) => { /* ... */ }
//!     WaitOutcome::Interrupted => { /* undetermined */ }
//!     WaitOutcome::ShuttingDown => { /* treat as empty */ }
//! }
//! ```
//!
//! # Completion
//!
//! The wait ends as soon as the aggregator reports that it needs no further replies, or
//! once every recipient has either replied or departed. A departure counts exactly like a
//! reply that carried nothing.

mod coordinator;
mod registry;

pub use coordinator::{ReplyCoordinator, WaitOutcome};
pub use registry::ReplyRegistry;

use std::fmt;

use tessera_backend::MemberId;

use crate::messages::ReplyBody;

/// Correlation key of an in-flight operation, unique within one member process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(i32);

impl ProcessorId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Folds replies from individual members into the result of one operation.
pub trait ReplyAggregator: Send + 'static {
    type Output: Send + 'static;

    /// Fold one reply. Returns `true` once no further replies are needed.
    fn accept(&mut self, sender: MemberId, body: ReplyBody) -> bool;

    /// Hand out the aggregate. Called at most once, when the operation completes.
    fn take_result(&mut self) -> Self::Output;
}

/// Registry-side view of an in-flight aggregation.
pub(crate) trait ReplySink: Send + Sync {
    fn on_reply(&self, sender: MemberId, body: ReplyBody);

    fn on_departure(&self, member: MemberId);
}
