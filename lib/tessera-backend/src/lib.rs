// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tessera Backend: member identity, transports and per-peer frame routing.

mod identity;
mod memory;
mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

pub use identity::{MEMBER_ID_LEN, MemberId};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use transport::{
    DataStreams, MessageType, Transport, TransportAdapter, TransportError, TransportErrorHandler,
    make_channels,
};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("No transports configured")]
    NoTransports,

    #[error("No compatible transports found for member {0}")]
    NoCompatibleTransports(MemberId),

    #[error("Member not registered: {0}")]
    MemberNotRegistered(MemberId),

    #[error("Distribution is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Routes outbound frames to peers over the first transport that accepted each peer.
pub struct Backend {
    member_id: MemberId,
    transports: Vec<Arc<dyn Transport>>,
    routes: DashMap<MemberId, Arc<dyn Transport>>,
    shutting_down: AtomicBool,
}

impl Backend {
    /// Start every transport for `member_id`, returning the backend and the inbound streams.
    ///
    /// Transports are tried in the order given when registering peers.
    pub fn new(
        member_id: MemberId,
        transports: Vec<Arc<dyn Transport>>,
    ) -> Result<(Self, DataStreams), BackendError> {
        if transports.is_empty() {
            return Err(BackendError::NoTransports);
        }

        let (adapter, data_streams) = make_channels();
        for transport in &transports {
            transport.start(member_id, adapter.clone())?;
        }

        Ok((
            Self {
                member_id,
                transports,
                routes: DashMap::new(),
                shutting_down: AtomicBool::new(false),
            },
            data_streams,
        ))
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn register_peer(&self, peer: MemberId) -> Result<(), BackendError> {
        if self.is_shutting_down() {
            return Err(BackendError::ShuttingDown);
        }

        let transport = self
            .transports
            .iter()
            .find(|transport| transport.register(peer).is_ok())
            .ok_or(BackendError::NoCompatibleTransports(peer))?;

        self.routes.insert(peer, transport.clone());
        Ok(())
    }

    pub fn unregister_peer(&self, peer: MemberId) {
        if let Some((_, transport)) = self.routes.remove(&peer) {
            transport.unregister(peer);
        }
    }

    /// Hand a frame to the transport routing `target`.
    ///
    /// Returns once the frame is queued; asynchronous delivery failures are reported to
    /// `on_error`.
    pub fn send_message(
        &self,
        target: MemberId,
        header: Bytes,
        payload: Bytes,
        message_type: MessageType,
        on_error: Arc<dyn TransportErrorHandler>,
    ) -> Result<(), BackendError> {
        if self.is_shutting_down() {
            return Err(BackendError::ShuttingDown);
        }

        let transport = self
            .routes
            .get(&target)
            .map(|entry| entry.clone())
            .ok_or(BackendError::MemberNotRegistered(target))?;

        transport.send_message(target, header, payload, message_type, on_error);
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Refuse further sends and detach every transport. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.routes.clear();
        for transport in &self.transports {
            transport.shutdown();
        }
        tracing::debug!(member = %self.member_id, "backend shut down");
    }
}
