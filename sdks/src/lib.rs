// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
/// Policy Decision Point Rust SDK
///
/// Typed client for consumers (the orchestration engine, the admin portal)
/// calling the PDP over HTTP. Request and response bodies are the same types
/// the server serializes.

pub mod client;

pub use client::{PdpClient, PdpClientError};
pub use pdp_core::presentation::dto::*;
