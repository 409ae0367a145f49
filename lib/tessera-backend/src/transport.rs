// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

use super::MemberId;

use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Peer not registered: {0}")]
    PeerNotRegistered(MemberId),

    #[error("Transport not started")]
    NotStarted,

    #[error("Transport already started for member {0}")]
    AlreadyStarted(MemberId),

    #[error("Transport is shut down")]
    Shutdown,
}

/// A cluster transport.
///
/// Sending is fire-and-forget: a frame handed to [`Transport::send_message`] carries no
/// delivery acknowledgement. Delivery failures that the transport can observe are reported
/// through the supplied [`TransportErrorHandler`].
pub trait Transport: Send + Sync {
    /// Attach the transport for the local member; inbound frames are pushed into `channels`.
    fn start(&self, member_id: MemberId, channels: TransportAdapter) -> Result<(), TransportError>;

    fn register(&self, peer: MemberId) -> Result<(), TransportError>;

    fn unregister(&self, peer: MemberId);

    fn send_message(
        &self,
        target: MemberId,
        header: Bytes,
        payload: Bytes,
        message_type: MessageType,
        on_error: Arc<dyn TransportErrorHandler>,
    );

    fn shutdown(&self);
}

pub trait TransportErrorHandler: Send + Sync {
    fn on_error(&self, header: Bytes, payload: Bytes, error: String);
}

/// Message type discriminator for routing frames to appropriate streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// A request to be processed by a handler on the receiving member.
    Message,
    /// A reply routed back to an in-flight operation on the receiving member.
    Response,
}

#[derive(Clone)]
pub struct TransportAdapter {
    pub message_stream: flume::Sender<(Bytes, Bytes)>,
    pub response_stream: flume::Sender<(Bytes, Bytes)>,
}

impl TransportAdapter {
    /// Push an inbound frame onto the stream for its message type.
    pub fn deliver(
        &self,
        message_type: MessageType,
        header: Bytes,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let stream = match message_type {
            MessageType::Message => &self.message_stream,
            MessageType::Response => &self.response_stream,
        };
        stream
            .send((header, payload))
            .map_err(|_| TransportError::Shutdown)
    }
}

pub struct DataStreams {
    pub message_stream: flume::Receiver<(Bytes, Bytes)>,
    pub response_stream: flume::Receiver<(Bytes, Bytes)>,
}

type DataStreamTuple = (
    flume::Receiver<(Bytes, Bytes)>,
    flume::Receiver<(Bytes, Bytes)>,
);

impl DataStreams {
    pub fn into_parts(self) -> DataStreamTuple {
        (self.message_stream, self.response_stream)
    }
}

pub fn make_channels() -> (TransportAdapter, DataStreams) {
    let (message_tx, message_rx) = flume::unbounded();
    let (response_tx, response_rx) = flume::unbounded();
    (
        TransportAdapter {
            message_stream: message_tx,
            response_stream: response_tx,
        },
        DataStreams {
            message_stream: message_rx,
            response_stream: response_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_routes_by_message_type() {
        let (adapter, streams) = make_channels();
        let (messages, responses) = streams.into_parts();

        adapter
            .deliver(MessageType::Response, Bytes::from_static(b"h"), Bytes::new())
            .unwrap();
        assert!(messages.try_recv().is_err());
        let (header, _) = responses.try_recv().unwrap();
        assert_eq!(&header[..], b"h");
    }

    #[test]
    fn adapter_reports_closed_streams() {
        let (adapter, streams) = make_channels();
        drop(streams);
        assert!(matches!(
            adapter.deliver(MessageType::Message, Bytes::new(), Bytes::new()),
            Err(TransportError::Shutdown)
        ));
    }
}
