// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Tessera Distribution Messages
//!
//! The closed set of messages exchanged between members. Every message kind carries a
//! stable type identifier written at the front of its frame header, which is what the
//! receiving member dispatches on.

mod codec;

pub use codec::{DecodeError, EncodeError};

use std::fmt;

use tessera_backend::{MemberId, MessageType};

use crate::replies::ProcessorId;
use crate::version::{EventId, VersionTag};

/// Type identifier of [`FindVersionTagMessage`] frames.
pub const FIND_VERSION_TAG: i16 = 2153;

/// Type identifier of version-tag [`ReplyMessage`] frames.
pub const VERSION_TAG_REPLY: i16 = 2154;

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    FindVersionTag = FIND_VERSION_TAG,
    VersionTagReply = VERSION_TAG_REPLY,
}

impl MessageKind {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            FIND_VERSION_TAG => Some(MessageKind::FindVersionTag),
            VERSION_TAG_REPLY => Some(MessageKind::VersionTagReply),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Requests go to the handler stream, replies to the reply stream.
    pub fn message_type(self) -> MessageType {
        match self {
            MessageKind::FindVersionTag => MessageType::Message,
            MessageKind::VersionTagReply => MessageType::Response,
        }
    }
}

/// Asks a member whether it has recorded a version tag for a client event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindVersionTagMessage {
    processor_id: ProcessorId,
    region_path: String,
    event_id: EventId,
    is_bulk_op: bool,
}

impl FindVersionTagMessage {
    pub fn new(
        processor_id: ProcessorId,
        region_path: impl Into<String>,
        event_id: EventId,
        is_bulk_op: bool,
    ) -> Self {
        Self {
            processor_id,
            region_path: region_path.into(),
            event_id,
            is_bulk_op,
        }
    }

    pub fn processor_id(&self) -> ProcessorId {
        self.processor_id
    }

    pub fn region_path(&self) -> &str {
        &self.region_path
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn is_bulk_op(&self) -> bool {
        self.is_bulk_op
    }
}

impl fmt::Display for FindVersionTagMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FindVersionTagMessage(processorId={};region={};eventId={};isBulkOp={})",
            self.processor_id, self.region_path, self.event_id, self.is_bulk_op
        )
    }
}

/// Payload of a reply, one variant per reply kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// `None` means the replying member has no record of the event.
    VersionTag(Option<VersionTag>),
}

impl ReplyBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            ReplyBody::VersionTag(_) => MessageKind::VersionTagReply,
        }
    }
}

/// Generic reply envelope: the processor id of the operation being answered plus a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    processor_id: ProcessorId,
    body: ReplyBody,
}

impl ReplyMessage {
    pub fn new(processor_id: ProcessorId, body: ReplyBody) -> Self {
        Self { processor_id, body }
    }

    pub fn version_tag(processor_id: ProcessorId, tag: Option<VersionTag>) -> Self {
        Self::new(processor_id, ReplyBody::VersionTag(tag))
    }

    pub fn processor_id(&self) -> ProcessorId {
        self.processor_id
    }

    pub fn body(&self) -> &ReplyBody {
        &self.body
    }

    pub fn into_body(self) -> ReplyBody {
        self.body
    }
}

impl fmt::Display for ReplyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ReplyBody::VersionTag(Some(tag)) => write!(f, "VersionTagReply({tag})"),
            ReplyBody::VersionTag(None) => write!(f, "VersionTagReply(null)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionMessage {
    FindVersionTag(FindVersionTagMessage),
    Reply(ReplyMessage),
}

impl DistributionMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            DistributionMessage::FindVersionTag(_) => MessageKind::FindVersionTag,
            DistributionMessage::Reply(reply) => reply.body.kind(),
        }
    }
}

impl fmt::Display for DistributionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionMessage::FindVersionTag(msg) => fmt::Display::fmt(msg, f),
            DistributionMessage::Reply(reply) => fmt::Display::fmt(reply, f),
        }
    }
}

/// A message together with the member that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: MemberId,
    pub message: DistributionMessage,
}

impl Envelope {
    pub fn new(sender: MemberId, message: DistributionMessage) -> Self {
        Self { sender, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(MessageKind::FindVersionTag.as_i16(), FIND_VERSION_TAG);
        assert_eq!(MessageKind::VersionTagReply.as_i16(), VERSION_TAG_REPLY);
        assert_ne!(FIND_VERSION_TAG, VERSION_TAG_REPLY);
        assert_eq!(
            MessageKind::from_i16(VERSION_TAG_REPLY),
            Some(MessageKind::VersionTagReply)
        );
        assert_eq!(MessageKind::from_i16(0), None);
    }

    #[test]
    fn requests_and_replies_use_separate_streams() {
        assert_eq!(
            MessageKind::FindVersionTag.message_type(),
            MessageType::Message
        );
        assert_eq!(
            MessageKind::VersionTagReply.message_type(),
            MessageType::Response
        );
    }

    #[test]
    fn display_matches_diagnostic_format() {
        let msg = FindVersionTagMessage::new(
            ProcessorId::new(12),
            "/R",
            EventId::new(vec![0x01], 4, 5),
            true,
        );
        assert_eq!(
            msg.to_string(),
            "FindVersionTagMessage(processorId=12;region=/R;eventId=EventId[id=01;threadID=4;sequenceID=5];isBulkOp=true)"
        );
        assert_eq!(
            ReplyMessage::version_tag(ProcessorId::new(12), None).to_string(),
            "VersionTagReply(null)"
        );
    }
}
