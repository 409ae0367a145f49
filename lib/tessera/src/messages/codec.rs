// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Frame encoding for distribution messages.
//!
//! Header (18 bytes):
//! - 2 bytes: message kind (i16, big-endian)
//! - 16 bytes: sender member id
//!
//! `FindVersionTag` payload:
//! - 4 bytes: processor id (i32)
//! - 2 bytes + N: region path (u16 length, UTF-8)
//! - event id: 2 bytes + N producer, 8 bytes thread id, 8 bytes sequence id
//! - 1 byte: bulk-op flag
//!
//! `VersionTagReply` payload:
//! - 4 bytes: processor id (i32)
//! - rest: nullable version tag (MessagePack)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use tessera_backend::{MEMBER_ID_LEN, MemberId, MessageType};

use super::{
    DistributionMessage, Envelope, FindVersionTagMessage, MessageKind, ReplyBody, ReplyMessage,
};
use crate::replies::ProcessorId;
use crate::version::{EventId, VersionTag};

const HEADER_LEN: usize = 2 + MEMBER_ID_LEN;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Header too short: expected 18 bytes, got {0}")]
    HeaderTooShort(usize),

    #[error("Unknown message kind: {0}")]
    UnknownKind(i16),

    #[error("Payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("Invalid UTF-8 in region path")]
    InvalidUtf8,

    #[error("Failed to deserialize version tag: {0}")]
    VersionTag(#[from] rmp_serde::decode::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Region path too long: {0} bytes exceeds maximum of 65535")]
    RegionPathTooLong(usize),

    #[error("Event producer too long: {0} bytes exceeds maximum of 65535")]
    ProducerTooLong(usize),

    #[error("Failed to serialize version tag: {0}")]
    VersionTag(#[from] rmp_serde::encode::Error),
}

impl Envelope {
    /// Encode into `(header, payload, message_type)` ready for a transport.
    pub fn encode(&self) -> Result<(Bytes, Bytes, MessageType), EncodeError> {
        let kind = self.message.kind();

        let mut header = BytesMut::with_capacity(HEADER_LEN);
        header.put_i16(kind.as_i16());
        header.put_slice(&self.sender.to_bytes());

        let payload = match &self.message {
            DistributionMessage::FindVersionTag(msg) => encode_find_version_tag(msg)?,
            DistributionMessage::Reply(reply) => encode_reply(reply)?,
        };

        Ok((header.freeze(), payload, kind.message_type()))
    }

    pub fn decode(header: Bytes, payload: Bytes) -> Result<Self, DecodeError> {
        let mut header = header;
        if header.len() < HEADER_LEN {
            return Err(DecodeError::HeaderTooShort(header.len()));
        }

        let raw_kind = header.get_i16();
        let kind = MessageKind::from_i16(raw_kind).ok_or(DecodeError::UnknownKind(raw_kind))?;

        let mut sender = [0u8; MEMBER_ID_LEN];
        header.copy_to_slice(&mut sender);
        let sender = MemberId::from_bytes(sender);

        let mut payload = payload;
        let message = match kind {
            MessageKind::FindVersionTag => {
                DistributionMessage::FindVersionTag(decode_find_version_tag(&mut payload)?)
            }
            MessageKind::VersionTagReply => {
                let processor_id = ProcessorId::new(read_i32(&mut payload, "processor id")?);
                let tag: Option<VersionTag> = rmp_serde::from_slice(&payload)?;
                DistributionMessage::Reply(ReplyMessage::new(
                    processor_id,
                    ReplyBody::VersionTag(tag),
                ))
            }
        };

        Ok(Envelope { sender, message })
    }
}

fn encode_find_version_tag(msg: &FindVersionTagMessage) -> Result<Bytes, EncodeError> {
    let path = msg.region_path().as_bytes();
    if path.len() > u16::MAX as usize {
        return Err(EncodeError::RegionPathTooLong(path.len()));
    }

    let event_id = msg.event_id();
    let producer = event_id.producer();
    if producer.len() > u16::MAX as usize {
        return Err(EncodeError::ProducerTooLong(producer.len()));
    }

    let capacity = 4 + 2 + path.len() + 2 + producer.len() + 8 + 8 + 1;
    let mut bytes = BytesMut::with_capacity(capacity);
    bytes.put_i32(msg.processor_id().as_i32());
    bytes.put_u16(path.len() as u16);
    bytes.put_slice(path);
    bytes.put_u16(producer.len() as u16);
    bytes.put_slice(producer);
    bytes.put_i64(event_id.thread_id());
    bytes.put_i64(event_id.sequence_id());
    bytes.put_u8(msg.is_bulk_op() as u8);

    Ok(bytes.freeze())
}

fn encode_reply(reply: &ReplyMessage) -> Result<Bytes, EncodeError> {
    let body = match reply.body() {
        ReplyBody::VersionTag(tag) => rmp_serde::to_vec(tag)?,
    };

    let mut bytes = BytesMut::with_capacity(4 + body.len());
    bytes.put_i32(reply.processor_id().as_i32());
    bytes.put_slice(&body);
    Ok(bytes.freeze())
}

fn decode_find_version_tag(payload: &mut Bytes) -> Result<FindVersionTagMessage, DecodeError> {
    let processor_id = ProcessorId::new(read_i32(payload, "processor id")?);

    let path = read_prefixed(payload, "region path")?;
    let region_path = String::from_utf8(path.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?;

    let producer = read_prefixed(payload, "event producer")?;
    if payload.remaining() < 8 + 8 + 1 {
        return Err(DecodeError::Truncated("event sequence"));
    }
    let thread_id = payload.get_i64();
    let sequence_id = payload.get_i64();
    let is_bulk_op = payload.get_u8() != 0;

    Ok(FindVersionTagMessage::new(
        processor_id,
        region_path,
        EventId::new(producer, thread_id, sequence_id),
        is_bulk_op,
    ))
}

fn read_i32(buf: &mut Bytes, what: &'static str) -> Result<i32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated(what));
    }
    Ok(buf.get_i32())
}

fn read_prefixed(buf: &mut Bytes, what: &'static str) -> Result<Bytes, DecodeError> {
    if buf.remaining() < 2 {
        return Err(DecodeError::Truncated(what));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(DecodeError::Truncated(what));
    }
    Ok(buf.copy_to_bytes(len))
}
