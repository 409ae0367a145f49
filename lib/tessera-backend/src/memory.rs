// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process transport.
//!
//! A [`MemoryNetwork`] connects any number of members living in one process. Each member
//! obtains its own [`MemoryTransport`] from the network. Frames are pushed directly into the
//! receiving member's [`TransportAdapter`] streams.
//!
//! Members can be isolated with [`MemoryNetwork::isolate`]: frames addressed to (or sent by)
//! an isolated member are silently dropped, which models a member that is unreachable but
//! has not yet been declared departed by membership.

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use crate::MemberId;
use crate::transport::{
    MessageType, Transport, TransportAdapter, TransportError, TransportErrorHandler,
};

#[derive(Default)]
struct NetworkInner {
    endpoints: DashMap<MemberId, TransportAdapter>,
    isolated: DashSet<MemberId>,
}

/// Shared in-process network fabric.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport attached to this network.
    pub fn transport(&self) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            network: self.clone(),
            local: Mutex::new(None),
            peers: DashSet::new(),
        })
    }

    /// Silently drop every frame to or from `member` until [`MemoryNetwork::heal`] is called.
    pub fn isolate(&self, member: MemberId) {
        self.inner.isolated.insert(member);
    }

    pub fn heal(&self, member: MemberId) {
        self.inner.isolated.remove(&member);
    }

    pub fn is_attached(&self, member: MemberId) -> bool {
        self.inner.endpoints.contains_key(&member)
    }

    fn is_isolated(&self, member: &MemberId) -> bool {
        self.inner.isolated.contains(member)
    }

    fn endpoint(&self, member: &MemberId) -> Option<TransportAdapter> {
        self.inner.endpoints.get(member).map(|entry| entry.clone())
    }
}

/// A member's attachment to a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    local: Mutex<Option<MemberId>>,
    peers: DashSet<MemberId>,
}

impl MemoryTransport {
    fn local(&self) -> Option<MemberId> {
        *self.local.lock()
    }
}

impl Transport for MemoryTransport {
    fn start(&self, member_id: MemberId, channels: TransportAdapter) -> Result<(), TransportError> {
        let mut local = self.local.lock();
        if let Some(existing) = *local {
            return Err(TransportError::AlreadyStarted(existing));
        }
        self.network.inner.endpoints.insert(member_id, channels);
        *local = Some(member_id);
        Ok(())
    }

    fn register(&self, peer: MemberId) -> Result<(), TransportError> {
        if self.local().is_none() {
            return Err(TransportError::NotStarted);
        }
        self.peers.insert(peer);
        Ok(())
    }

    fn unregister(&self, peer: MemberId) {
        self.peers.remove(&peer);
    }

    fn send_message(
        &self,
        target: MemberId,
        header: Bytes,
        payload: Bytes,
        message_type: MessageType,
        on_error: Arc<dyn TransportErrorHandler>,
    ) {
        let Some(local) = self.local() else {
            on_error.on_error(header, payload, TransportError::NotStarted.to_string());
            return;
        };

        if !self.peers.contains(&target) {
            on_error.on_error(
                header,
                payload,
                TransportError::PeerNotRegistered(target).to_string(),
            );
            return;
        }

        if self.network.is_isolated(&target) || self.network.is_isolated(&local) {
            trace!(%local, %target, ?message_type, "dropping frame on isolated link");
            return;
        }

        match self.network.endpoint(&target) {
            Some(endpoint) => {
                if let Err(e) = endpoint.deliver(message_type, header.clone(), payload.clone()) {
                    on_error.on_error(header, payload, e.to_string());
                }
            }
            None => {
                on_error.on_error(header, payload, format!("no endpoint for member {target}"));
            }
        }
    }

    fn shutdown(&self) {
        if let Some(local) = self.local.lock().take() {
            self.network.inner.endpoints.remove(&local);
        }
        self.peers.clear();
    }
}
