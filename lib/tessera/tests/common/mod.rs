// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process cluster harness for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tessera::config::{ReplyConfig, TesseraConfig};
use tessera::region::{LocalRegion, RegionCache};
use tessera::version::EventId;
use tessera::{MemberId, MemoryNetwork, Tessera};

pub struct Cluster {
    pub network: MemoryNetwork,
    pub members: Vec<Arc<Tessera>>,
    pub caches: Vec<Arc<RegionCache>>,
}

impl Cluster {
    /// Start `size` members on one in-memory network, each hosting an empty cache and
    /// routing to every other member.
    pub async fn start(size: usize) -> Self {
        let network = MemoryNetwork::new();
        let config = TesseraConfig {
            replies: ReplyConfig {
                ack_wait_threshold_secs: None,
            },
            ..Default::default()
        };

        let mut members = Vec::with_capacity(size);
        let mut caches = Vec::with_capacity(size);
        for _ in 0..size {
            let member = Tessera::builder()
                .add_transport(network.transport())
                .config(config.clone())
                .build()
                .await
                .expect("member starts");
            let cache = Arc::new(RegionCache::new());
            member.install_cache(cache.clone());
            members.push(member);
            caches.push(cache);
        }

        for member in &members {
            for peer in &members {
                if member.member_id() != peer.member_id() {
                    member.register_peer(peer.member_id()).expect("peer registers");
                }
            }
        }

        Self {
            network,
            members,
            caches,
        }
    }

    pub fn member(&self, index: usize) -> &Arc<Tessera> {
        &self.members[index]
    }

    pub fn id(&self, index: usize) -> MemberId {
        self.members[index].member_id()
    }

    /// Host a replicated region at `path` on every member. Each copy advises all other
    /// members as replica holders.
    pub fn replicate(&self, path: &str) -> Vec<Arc<LocalRegion>> {
        let holders: Vec<usize> = (0..self.members.len()).collect();
        self.host(path, &holders, LocalRegion::replicated)
    }

    /// Host a partitioned region at `path` on the members at `owners`.
    pub fn partition(&self, path: &str, owners: &[usize]) -> Vec<Arc<LocalRegion>> {
        self.host(path, owners, LocalRegion::partitioned)
    }

    fn host(
        &self,
        path: &str,
        holders: &[usize],
        make: fn(&str, MemberId) -> LocalRegion,
    ) -> Vec<Arc<LocalRegion>> {
        holders
            .iter()
            .map(|&index| {
                let region = Arc::new(make(path, self.id(index)));
                for &other in holders {
                    if other != index {
                        region.advisor().add_profile(self.id(other));
                    }
                }
                self.caches[index].add_region(region.clone());
                region
            })
            .collect()
    }

    pub async fn shutdown(self) {
        for member in &self.members {
            member.shutdown_and_wait().await;
        }
    }
}

pub fn event(sequence_id: i64) -> EventId {
    EventId::new(b"client-123".to_vec(), 1, sequence_id)
}
