// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Tessera
//!
//! Distributed version tag reconciliation for an in-memory data grid.
//!
//! A member replaying a client operation without version metadata asks the other holders of
//! the region whether any of them already recorded a tag for that event. The request is
//! scattered to every live holder; the first member that answers with a tag ends the wait,
//! and members that depart count as answering with nothing.

pub mod config;
pub mod logging;
pub mod lookup;
pub mod membership;
pub mod messages;
pub mod region;
pub mod replies;
mod server;
mod system;
pub mod version;

pub use config::{ConfigError, TesseraConfig};
pub use lookup::{LookupOutcome, find_version_tag};
pub use system::{SendError, Tessera, TesseraBuilder};

pub use tessera_backend::{MemberId, MemoryNetwork, MemoryTransport, Transport};
