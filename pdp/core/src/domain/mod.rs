// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer
//!
//! Pure types and rules of the Policy Decision Point. Nothing in here performs
//! IO; repositories are described as traits and implemented in
//! `crate::infrastructure`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Field policies, decisions, schema conversion, audit events

pub mod policy;
pub mod decision;
pub mod schema;
pub mod events;
pub mod repository;
pub mod config;
