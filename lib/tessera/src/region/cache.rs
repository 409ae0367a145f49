// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Region, RegionError, normalize_path};

/// Regions hosted by this process, keyed by full path.
#[derive(Default)]
pub struct RegionCache {
    regions: DashMap<String, Arc<dyn Region>>,
    closing: AtomicBool,
}

impl RegionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host `region`, replacing any region previously registered at the same path.
    pub fn add_region(&self, region: Arc<dyn Region>) {
        let path = region.full_path().to_string();
        tracing::debug!(%path, "region added to cache");
        self.regions.insert(path, region);
    }

    pub fn remove_region(&self, path: &str) -> Option<Arc<dyn Region>> {
        self.regions
            .remove(&normalize_path(path))
            .map(|(_, region)| region)
    }

    pub fn region(&self, path: &str) -> Option<Arc<dyn Region>> {
        self.regions
            .get(&normalize_path(path))
            .map(|entry| entry.value().clone())
    }

    /// Resolve a region on behalf of an inbound message.
    ///
    /// Fails with [`RegionError::CacheClosed`] once the cache has started closing. An
    /// unknown path is not an error.
    pub fn region_by_path_for_processing(
        &self,
        path: &str,
    ) -> Result<Option<Arc<dyn Region>>, RegionError> {
        if self.is_closed() {
            return Err(RegionError::CacheClosed);
        }
        Ok(self.region(path))
    }

    pub fn close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            tracing::debug!(regions = self.regions.len(), "cache closing");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl fmt::Debug for RegionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionCache")
            .field("regions", &self.regions.len())
            .field("closing", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::LocalRegion;
    use tessera_backend::MemberId;

    #[test]
    fn resolves_with_or_without_leading_slash() {
        let cache = RegionCache::new();
        cache.add_region(Arc::new(LocalRegion::replicated(
            "/orders",
            MemberId::new_v4(),
        )));

        assert!(cache.region("orders").is_some());
        assert!(cache.region("/orders").is_some());
        assert!(cache.region("/missing").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn closed_cache_refuses_processing() {
        let cache = RegionCache::new();
        cache.add_region(Arc::new(LocalRegion::replicated("/r", MemberId::new_v4())));

        assert!(cache.region_by_path_for_processing("/r").unwrap().is_some());
        assert!(cache.region_by_path_for_processing("/x").unwrap().is_none());

        cache.close();
        assert!(matches!(
            cache.region_by_path_for_processing("/r"),
            Err(RegionError::CacheClosed)
        ));
    }

    #[test]
    fn remove_region_detaches_it() {
        let cache = RegionCache::new();
        cache.add_region(Arc::new(LocalRegion::partitioned("/p", MemberId::new_v4())));
        assert!(cache.remove_region("p").is_some());
        assert!(cache.is_empty());
    }
}
