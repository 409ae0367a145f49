// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Version Tag Lookup
//!
//! Before re-applying a client operation that arrived without version metadata, a member
//! asks the other holders of the region whether any of them already recorded a tag for
//! the operation's event. The first member that answers with a tag ends the wait.

pub(crate) mod handler;

pub use handler::find_local_version_tag;

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tessera_backend::MemberId;

use crate::messages::{DistributionMessage, FindVersionTagMessage, ReplyBody};
use crate::region::Region;
use crate::replies::{ReplyAggregator, WaitOutcome};
use crate::system::{SendError, Tessera};
use crate::version::{EventId, VersionTag};

/// Result of a cluster-wide version tag lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// A member recorded this tag for the event.
    Found(VersionTag),
    /// No member that answered has a record.
    Absent,
    /// The wait was interrupted before an answer was found. Nothing is known about
    /// whether a record exists.
    Undetermined,
}

impl LookupOutcome {
    /// Collapse to the tag, treating an undetermined result like an absent one.
    pub fn into_version_tag(self) -> Option<VersionTag> {
        match self {
            LookupOutcome::Found(tag) => Some(tag),
            LookupOutcome::Absent | LookupOutcome::Undetermined => None,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        matches!(self, LookupOutcome::Undetermined)
    }
}

/// Keeps the first tag any member reports, stamped with that member's identity.
#[derive(Debug, Default)]
pub(crate) struct VersionTagAggregator {
    found: Option<VersionTag>,
}

impl ReplyAggregator for VersionTagAggregator {
    type Output = Option<VersionTag>;

    fn accept(&mut self, sender: MemberId, body: ReplyBody) -> bool {
        match body {
            ReplyBody::VersionTag(Some(mut tag)) => {
                tag.replace_null_ids(sender);
                self.found = Some(tag);
                true
            }
            ReplyBody::VersionTag(None) => false,
        }
    }

    fn take_result(&mut self) -> Self::Output {
        self.found.take()
    }
}

/// Members that may hold a record of events on `region`: the advised holders that are
/// live, excluding this member.
fn recipients(system: &Tessera, region: &dyn Region) -> HashSet<MemberId> {
    let mut advised = region.topology().recipients();
    advised.remove(&system.member_id());
    system.membership().live_subset(advised)
}

/// Ask every other holder of `region` for a version tag recorded for `event_id`.
///
/// Returns as soon as one member answers with a tag, or once every recipient has answered
/// or departed. Cancelling `interrupt` abandons the wait with
/// [`LookupOutcome::Undetermined`]; the token stays cancelled. A member that is shutting
/// down resolves the lookup as [`LookupOutcome::Absent`].
pub async fn find_version_tag(
    system: &Tessera,
    region: &dyn Region,
    event_id: &EventId,
    is_bulk_op: bool,
    interrupt: &CancellationToken,
) -> LookupOutcome {
    let recipients = recipients(system, region);
    if recipients.is_empty() {
        debug!(region = region.full_path(), %event_id, "no recipients for version tag lookup");
        return LookupOutcome::Absent;
    }

    let coordinator = system
        .membership()
        .open_coordinator(recipients.iter().copied(), VersionTagAggregator::default());
    let request = FindVersionTagMessage::new(
        coordinator.processor_id(),
        region.full_path(),
        event_id.clone(),
        is_bulk_op,
    );
    debug!(recipients = recipients.len(), %request, "sending version tag lookup");

    match system.put_outgoing(recipients, &DistributionMessage::FindVersionTag(request)) {
        Ok(unroutable) => {
            for member in unroutable {
                coordinator.member_departed(member);
            }
        }
        Err(SendError::ShuttingDown) => {
            debug!(region = region.full_path(), %event_id, "version tag lookup skipped: shutting down");
            return LookupOutcome::Absent;
        }
        Err(e) => {
            warn!(region = region.full_path(), %event_id, error = %e, "version tag lookup not sent");
            return LookupOutcome::Absent;
        }
    }

    match coordinator.wait(interrupt).await {
        WaitOutcome::Satisfied(Some(tag)) | WaitOutcome::Exhausted(Some(tag)) => {
            debug!(region = region.full_path(), %event_id, %tag, "version tag found");
            LookupOutcome::Found(tag)
        }
        WaitOutcome::Satisfied(None) | WaitOutcome::Exhausted(None) => {
            debug!(region = region.full_path(), %event_id, "version tag absent");
            LookupOutcome::Absent
        }
        WaitOutcome::Interrupted => {
            info!(region = region.full_path(), %event_id, "version tag lookup interrupted; result undetermined");
            LookupOutcome::Undetermined
        }
        WaitOutcome::ShuttingDown => {
            debug!(region = region.full_path(), %event_id, "version tag lookup abandoned: shutting down");
            LookupOutcome::Absent
        }
    }
}
