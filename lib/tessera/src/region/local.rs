// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};

use tessera_backend::MemberId;

use super::{EventHistory, MemberAdvisor, Region, RegionError, RegionTopology, normalize_path};
use crate::version::{EventId, VersionTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Replicated,
    Partitioned,
}

/// A region hosted by this process.
#[derive(Debug)]
pub struct LocalRegion {
    path: String,
    kind: RegionKind,
    version_member: MemberId,
    advisor: MemberAdvisor,
    history: EventHistory,
    destroyed: AtomicBool,
}

impl LocalRegion {
    pub fn new(path: &str, kind: RegionKind, version_member: MemberId) -> Self {
        Self {
            path: normalize_path(path),
            kind,
            version_member,
            advisor: MemberAdvisor::new(),
            history: EventHistory::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn replicated(path: &str, version_member: MemberId) -> Self {
        Self::new(path, RegionKind::Replicated, version_member)
    }

    pub fn partitioned(path: &str, version_member: MemberId) -> Self {
        Self::new(path, RegionKind::Partitioned, version_member)
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Replica holders or data store owners of this region on other members.
    pub fn advisor(&self) -> &MemberAdvisor {
        &self.advisor
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    /// After destruction every ledger query fails with [`RegionError::Destroyed`].
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn check_live(&self) -> Result<(), RegionError> {
        if self.is_destroyed() {
            return Err(RegionError::Destroyed(self.path.clone()));
        }
        Ok(())
    }
}

impl Region for LocalRegion {
    fn full_path(&self) -> &str {
        &self.path
    }

    fn topology(&self) -> RegionTopology<'_> {
        match self.kind {
            RegionKind::Replicated => RegionTopology::Replicated(&self.advisor),
            RegionKind::Partitioned => RegionTopology::Partitioned(&self.advisor),
        }
    }

    fn version_member(&self) -> MemberId {
        self.version_member
    }

    fn find_version_tag_for_client_event(
        &self,
        event_id: &EventId,
    ) -> Result<Option<VersionTag>, RegionError> {
        self.check_live()?;
        Ok(self.history.find_client_event(event_id))
    }

    fn find_version_tag_for_client_bulk_op(
        &self,
        event_id: &EventId,
    ) -> Result<Option<VersionTag>, RegionError> {
        self.check_live()?;
        Ok(self.history.find_client_bulk_op(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_follows_kind() {
        let member = MemberId::new_v4();
        assert!(!LocalRegion::replicated("r", member).topology().is_partitioned());
        assert!(LocalRegion::partitioned("r", member).topology().is_partitioned());
    }

    #[test]
    fn path_is_normalized() {
        let region = LocalRegion::replicated("orders", MemberId::new_v4());
        assert_eq!(region.full_path(), "/orders");
    }

    #[test]
    fn destroyed_region_rejects_queries() {
        let region = LocalRegion::replicated("/r", MemberId::new_v4());
        let event = EventId::new(b"p".to_vec(), 0, 1);
        region
            .history()
            .record_client_event(event.clone(), VersionTag::new(1, 1));
        assert!(region.find_version_tag_for_client_event(&event).unwrap().is_some());

        region.destroy();
        assert!(matches!(
            region.find_version_tag_for_client_event(&event),
            Err(RegionError::Destroyed(path)) if path == "/r"
        ));
        assert!(region.find_version_tag_for_client_bulk_op(&event).is_err());
    }
}
