// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::RwLock;
use std::collections::HashSet;

use tessera_backend::MemberId;

/// Advises which members should see a cache operation on a replicated region.
pub trait DistributionAdvisor: Send + Sync {
    fn advise_cache_op(&self) -> HashSet<MemberId>;
}

/// Advises which members currently host data for a partitioned region.
pub trait DataStoreAdvisor: Send + Sync {
    fn advise_data_store(&self) -> HashSet<MemberId>;
}

/// Set of member profiles known to host a region.
///
/// Profiles are added when a member announces that it hosts the region and removed when
/// it leaves or stops hosting it. A partitioned region records data store owners here; a
/// replicated region records replica holders.
#[derive(Debug, Default)]
pub struct MemberAdvisor {
    profiles: RwLock<HashSet<MemberId>>,
}

impl MemberAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&self, member: MemberId) -> bool {
        self.profiles.write().insert(member)
    }

    pub fn remove_profile(&self, member: MemberId) -> bool {
        self.profiles.write().remove(&member)
    }

    pub fn contains(&self, member: MemberId) -> bool {
        self.profiles.read().contains(&member)
    }

    pub fn profiles(&self) -> HashSet<MemberId> {
        self.profiles.read().clone()
    }
}

impl DistributionAdvisor for MemberAdvisor {
    fn advise_cache_op(&self) -> HashSet<MemberId> {
        self.profiles()
    }
}

impl DataStoreAdvisor for MemberAdvisor {
    fn advise_data_store(&self) -> HashSet<MemberId> {
        self.profiles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_track_membership() {
        let advisor = MemberAdvisor::new();
        let a = MemberId::new_v4();
        let b = MemberId::new_v4();

        assert!(advisor.add_profile(a));
        assert!(!advisor.add_profile(a));
        advisor.add_profile(b);
        assert_eq!(advisor.advise_cache_op(), HashSet::from([a, b]));

        assert!(advisor.remove_profile(a));
        assert!(!advisor.contains(a));
        assert_eq!(advisor.advise_data_store(), HashSet::from([b]));
    }
}
