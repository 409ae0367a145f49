// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Live member view of the local process.

use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Arc;

use tessera_backend::MemberId;

use crate::replies::{ReplyAggregator, ReplyCoordinator, ReplyRegistry};

/// Members this process currently considers part of the cluster.
///
/// Departures are forwarded to the reply registry so that in-flight operations stop
/// waiting for the departed member.
#[derive(Debug)]
pub struct Membership {
    local: MemberId,
    live: DashSet<MemberId>,
    replies: Arc<ReplyRegistry>,
}

impl Membership {
    pub fn new(local: MemberId, replies: Arc<ReplyRegistry>) -> Self {
        let live = DashSet::new();
        live.insert(local);
        Self {
            local,
            live,
            replies,
        }
    }

    pub fn local(&self) -> MemberId {
        self.local
    }

    /// Returns `false` if the member was already live.
    pub fn join(&self, member: MemberId) -> bool {
        let joined = self.live.insert(member);
        if joined {
            tracing::debug!(local = %self.local, %member, "member joined");
        }
        joined
    }

    /// Remove `member` and release every operation still waiting on it.
    pub fn depart(&self, member: MemberId) -> bool {
        if member == self.local {
            return false;
        }
        let departed = self.live.remove(&member).is_some();
        if departed {
            tracing::info!(local = %self.local, %member, "member departed");
            self.replies.member_departed(member);
        }
        departed
    }

    pub fn is_live(&self, member: MemberId) -> bool {
        self.live.contains(&member)
    }

    /// The members of `candidates` that are currently live.
    pub fn live_subset(&self, candidates: impl IntoIterator<Item = MemberId>) -> HashSet<MemberId> {
        candidates
            .into_iter()
            .filter(|member| self.live.contains(member))
            .collect()
    }

    pub fn members(&self) -> HashSet<MemberId> {
        self.live.iter().map(|member| *member).collect()
    }

    /// Open a reply coordinator over `recipients`, counting any recipient that is no longer
    /// live as already departed.
    ///
    /// The coordinator is registered before liveness is checked, so a departure that races
    /// with the open is either seen here or delivered to the registered coordinator.
    pub fn open_coordinator<A: ReplyAggregator>(
        &self,
        recipients: impl IntoIterator<Item = MemberId>,
        aggregator: A,
    ) -> ReplyCoordinator<A> {
        let coordinator = ReplyCoordinator::open(&self.replies, recipients, aggregator);
        for member in coordinator.outstanding() {
            if !self.is_live(member) {
                coordinator.member_departed(member);
            }
        }
        coordinator
    }
}
