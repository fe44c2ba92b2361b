// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Policy Decision Point core
//!
//! Field-level attribute-based access decisions for the data-exchange
//! platform: schema directive parsing, policy metadata persistence, the
//! allow-list grant lifecycle and the decision engine itself.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, adapters and HTTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
