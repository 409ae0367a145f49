// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_backend::MemberId;

/// Causal metadata recorded for a region entry mutation.
///
/// The member identity fields may hold a placeholder (`None`), meaning "the member that
/// recorded this tag". Tags leave the recording member only after
/// [`VersionTag::replace_null_ids`] has resolved the placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct VersionTag {
    entry_version: u32,
    region_version: u64,
    timestamp: u64,
    #[builder(setter(strip_option))]
    member_id: Option<MemberId>,
    #[builder(setter(strip_option))]
    previous_member_id: Option<MemberId>,
}

impl VersionTag {
    /// A tag whose identity fields are still placeholders.
    pub fn new(entry_version: u32, region_version: u64) -> Self {
        Self {
            entry_version,
            region_version,
            ..Default::default()
        }
    }

    pub fn builder() -> VersionTagBuilder {
        VersionTagBuilder::default()
    }

    pub fn entry_version(&self) -> u32 {
        self.entry_version
    }

    pub fn region_version(&self) -> u64 {
        self.region_version
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn previous_member_id(&self) -> Option<MemberId> {
        self.previous_member_id
    }

    /// True once no identity field holds a placeholder.
    pub fn is_canonical(&self) -> bool {
        self.member_id.is_some() && self.previous_member_id.is_some()
    }

    /// Resolve placeholder identities to `member`. Fields already set are left untouched,
    /// so repeated application is a no-op.
    pub fn replace_null_ids(&mut self, member: MemberId) {
        if self.member_id.is_none() {
            self.member_id = Some(member);
        }
        if self.previous_member_id.is_none() {
            self.previous_member_id = Some(member);
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{v{}; rv{}; time={}",
            self.entry_version, self.region_version, self.timestamp
        )?;
        if let Some(member) = self.member_id {
            write!(f, "; mbr={member}")?;
        }
        match self.previous_member_id {
            Some(previous) if Some(previous) != self.member_id => {
                write!(f, "; prev={previous}")?;
            }
            _ => {}
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_null_ids_fills_placeholders() {
        let member = MemberId::new_v4();
        let mut tag = VersionTag::new(7, 42);
        assert!(!tag.is_canonical());

        tag.replace_null_ids(member);
        assert!(tag.is_canonical());
        assert_eq!(tag.member_id(), Some(member));
        assert_eq!(tag.previous_member_id(), Some(member));
        assert_eq!(tag.entry_version(), 7);
        assert_eq!(tag.region_version(), 42);
    }

    #[test]
    fn replace_null_ids_is_idempotent() {
        let first = MemberId::new_v4();
        let other = MemberId::new_v4();

        let mut tag = VersionTag::new(1, 1);
        tag.replace_null_ids(first);
        let canonical = tag.clone();

        tag.replace_null_ids(first);
        assert_eq!(tag, canonical);
        tag.replace_null_ids(other);
        assert_eq!(tag, canonical);
    }

    #[test]
    fn replace_keeps_recorded_previous_member() {
        let writer = MemberId::new_v4();
        let previous = MemberId::new_v4();
        let mut tag = VersionTag::builder()
            .entry_version(3)
            .previous_member_id(previous)
            .build()
            .unwrap();

        tag.replace_null_ids(writer);
        assert_eq!(tag.member_id(), Some(writer));
        assert_eq!(tag.previous_member_id(), Some(previous));
    }

    #[test]
    fn display_shows_versions() {
        let tag = VersionTag::builder()
            .entry_version(7)
            .region_version(11)
            .timestamp(5)
            .build()
            .unwrap();
        assert_eq!(tag.to_string(), "{v7; rv11; time=5}");
    }
}
