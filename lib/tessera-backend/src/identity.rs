// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Cluster member identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Size of the wire form of a [`MemberId`].
pub const MEMBER_ID_LEN: usize = 16;

/// Identity of a member process in the cluster.
///
/// Wraps a UUID. The wire form is the 16 big-endian bytes of the UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Generate a fresh random member identity.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    pub fn to_bytes(&self) -> [u8; MEMBER_ID_LEN] {
        *self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; MEMBER_ID_LEN]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl From<Uuid> for MemberId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", self.0)
    }
}
