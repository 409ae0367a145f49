// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Regions and the local cache that hosts them.
//!
//! The lookup protocol only reads from these types: it asks a region for its topology to
//! choose recipients, and asks the region's event ledger whether a client event has already
//! been recorded. [`LocalRegion`] and [`RegionCache`] are the in-process implementations.

mod advisor;
mod cache;
mod history;
mod local;

pub use advisor::{DataStoreAdvisor, DistributionAdvisor, MemberAdvisor};
pub use cache::RegionCache;
pub use history::EventHistory;
pub use local::{LocalRegion, RegionKind};

use std::collections::HashSet;

use thiserror::Error;

use tessera_backend::MemberId;

use crate::version::{EventId, VersionTag};

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Cache is closing")]
    CacheClosed,

    #[error("Region destroyed: {0}")]
    Destroyed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How a region spreads its data, and the advisor that knows who holds it.
#[derive(Clone, Copy)]
pub enum RegionTopology<'a> {
    /// Every replica holder keeps a full copy.
    Replicated(&'a dyn DistributionAdvisor),
    /// Data is split across data store owners.
    Partitioned(&'a dyn DataStoreAdvisor),
}

impl RegionTopology<'_> {
    /// Members that may hold a record for this region, as currently advised.
    pub fn recipients(&self) -> HashSet<MemberId> {
        match self {
            RegionTopology::Replicated(advisor) => advisor.advise_cache_op(),
            RegionTopology::Partitioned(advisor) => advisor.advise_data_store(),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self, RegionTopology::Partitioned(_))
    }
}

/// A region as seen by the lookup protocol.
pub trait Region: Send + Sync {
    /// Canonical path, always starting with `/`.
    fn full_path(&self) -> &str;

    fn topology(&self) -> RegionTopology<'_>;

    /// Identity this member stamps into version tags it hands out.
    fn version_member(&self) -> MemberId;

    fn find_version_tag_for_client_event(
        &self,
        event_id: &EventId,
    ) -> Result<Option<VersionTag>, RegionError>;

    fn find_version_tag_for_client_bulk_op(
        &self,
        event_id: &EventId,
    ) -> Result<Option<VersionTag>, RegionError>;
}

/// Region paths are compared in their canonical, `/`-prefixed form.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
