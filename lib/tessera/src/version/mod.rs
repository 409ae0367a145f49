// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event identity and version metadata for region entry mutations.

mod event_id;
mod tag;

pub use event_id::EventId;
pub use tag::{VersionTag, VersionTagBuilder, VersionTagBuilderError};
