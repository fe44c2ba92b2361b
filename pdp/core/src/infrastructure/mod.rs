// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod db;
pub mod repositories;
pub mod schema_parser;

pub use audit::{audit_sink_from_config, AuditSink, HttpAuditEmitter, TracingAuditSink};
pub use schema_parser::SchemaDirectiveParser;
