// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`pdp-core`)
//!
//! HTTP surface that translates external requests into use case calls. No
//! policy logic lives here.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Axum router: `/policy/*`, `/api/v1/policy/*`, `/health` |
//! | [`dto`] | Request / response bodies, shared with the SDK |

pub mod api;
pub mod dto;
