// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Tessera Inbound Server
//!
//! Two loops per member: one decodes requests and spawns their handlers, the other routes
//! replies to the operations waiting for them. Both stop when the member shuts down or its
//! transports detach.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use tessera_backend::DataStreams;

use crate::lookup::handler::process_find_version_tag;
use crate::messages::{DistributionMessage, Envelope};
use crate::replies::ReplyRegistry;
use crate::system::Tessera;

const TARGET: &str = "tessera::server";

pub(crate) fn start(system: &Arc<Tessera>, data_streams: DataStreams) {
    let (message_rx, response_rx) = data_streams.into_parts();
    let shutdown = system.shutdown_token().clone();
    let semaphore = system
        .config()
        .server
        .handler_concurrency
        .map(|limit| Arc::new(Semaphore::new(limit)));

    system.tracker().spawn(message_loop(
        Arc::downgrade(system),
        message_rx,
        semaphore,
        shutdown.clone(),
    ));
    system
        .tracker()
        .spawn(response_loop(system.replies().clone(), response_rx, shutdown));
}

async fn recv_or_shutdown(
    rx: &flume::Receiver<(Bytes, Bytes)>,
    shutdown: &CancellationToken,
) -> Option<(Bytes, Bytes)> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        frame = rx.recv_async() => frame.ok(),
    }
}

/// Request loop: decode, then run each handler on its own task.
async fn message_loop(
    system: Weak<Tessera>,
    message_rx: flume::Receiver<(Bytes, Bytes)>,
    semaphore: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
) {
    while let Some((header, payload)) = recv_or_shutdown(&message_rx, &shutdown).await {
        let envelope = match Envelope::decode(header, payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(target: TARGET, "Failed to decode request: {}", e);
                continue;
            }
        };

        let Some(system) = system.upgrade() else {
            break;
        };

        tracing::debug!(target: TARGET, sender = %envelope.sender, message = %envelope.message, "Received request");

        match envelope.message {
            DistributionMessage::FindVersionTag(request) => {
                let sender = envelope.sender;
                let semaphore = semaphore.clone();
                let handler_system = system.clone();
                system.tracker().spawn(async move {
                    let _permit = match semaphore {
                        Some(semaphore) => match semaphore.acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(_) => return,
                        },
                        None => None,
                    };
                    process_find_version_tag(&handler_system, sender, request);
                });
            }
            DistributionMessage::Reply(reply) => {
                tracing::warn!(target: TARGET, sender = %envelope.sender, %reply, "Reply arrived on the request stream; dropping");
            }
        }
    }
    tracing::debug!(target: TARGET, "request loop stopped");
}

/// Reply loop: route each reply to its waiting operation.
async fn response_loop(
    replies: Arc<ReplyRegistry>,
    response_rx: flume::Receiver<(Bytes, Bytes)>,
    shutdown: CancellationToken,
) {
    while let Some((header, payload)) = recv_or_shutdown(&response_rx, &shutdown).await {
        match Envelope::decode(header, payload) {
            Ok(Envelope {
                sender,
                message: DistributionMessage::Reply(reply),
            }) => {
                tracing::trace!(target: TARGET, %sender, %reply, processor_id = %reply.processor_id(), "Received reply");
                let processor_id = reply.processor_id();
                replies.deliver(processor_id, sender, reply.into_body());
            }
            Ok(envelope) => {
                tracing::warn!(target: TARGET, sender = %envelope.sender, message = %envelope.message, "Request arrived on the reply stream; dropping");
            }
            Err(e) => {
                tracing::error!(target: TARGET, "Failed to decode reply: {}", e);
            }
        }
    }
    tracing::debug!(target: TARGET, "reply loop stopped");
}
