// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Register Schema Use Case
//!
//! Derives field policies from a provider's annotated schema and replaces the
//! stored field set of that schema with them.
//!
//! # Flow
//!
//! 1. Parse the SDL via `SchemaDirectiveParser` → `FieldDirective`s
//! 2. Convert with owner resolution (override → annotation → provider → unresolved)
//! 3. `FieldPolicyRepository::replace_schema_fields`
//! 4. Emit `PolicyEvent::SchemaRegistered`
//!
//! Unresolved owners are reported back to the caller and stored as the
//! reserved `unknown` owner.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::{require_non_empty, RequestContext};
use crate::domain::events::PolicyEvent;
use crate::domain::policy::{FieldPolicy, PolicyError};
use crate::domain::repository::FieldPolicyRepository;
use crate::domain::schema::{convert_directives, ConvertedField, SchemaConversion};
use crate::infrastructure::audit::AuditSink;
use crate::infrastructure::schema_parser::SchemaDirectiveParser;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSchemaRequest {
    pub schema_id: String,
    pub provider_id: String,
    pub sdl: String,
    /// Out-of-band owner per dotted field path, e.g. `{"person.nic": "citizen"}`
    #[serde(default)]
    pub field_owners: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredSchema {
    pub records: Vec<FieldPolicy>,
    pub fields: Vec<ConvertedField>,
    pub unresolved_owner_fields: Vec<String>,
}

/// Offline half of registration: parse and convert without touching the store.
pub fn convert_schema(request: &RegisterSchemaRequest) -> Result<SchemaConversion, PolicyError> {
    require_non_empty(&request.schema_id, "schemaId")?;
    require_non_empty(&request.provider_id, "providerId")?;
    require_non_empty(&request.sdl, "sdl")?;

    let directives = SchemaDirectiveParser::parse(&request.sdl);
    if directives.is_empty() {
        return Err(PolicyError::InvalidArgument("sdl contains no annotated data fields".to_string()));
    }
    Ok(convert_directives(&directives, &request.provider_id, &request.field_owners))
}

#[async_trait]
pub trait RegisterSchemaUseCase: Send + Sync {
    async fn register(&self, ctx: &RequestContext, request: RegisterSchemaRequest) -> Result<RegisteredSchema, PolicyError>;
}

pub struct StandardRegisterSchemaUseCase {
    repository: Arc<dyn FieldPolicyRepository>,
    audit: Arc<dyn AuditSink>,
}

impl StandardRegisterSchemaUseCase {
    pub fn new(repository: Arc<dyn FieldPolicyRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, audit }
    }

    async fn execute(&self, request: &RegisterSchemaRequest) -> Result<RegisteredSchema, PolicyError> {
        let conversion = convert_schema(request)?;
        let unresolved_owner_fields = conversion.unresolved_owner_fields();

        let records = self
            .repository
            .replace_schema_fields(&request.schema_id, &conversion.records)
            .await?;

        Ok(RegisteredSchema {
            records,
            fields: conversion.fields,
            unresolved_owner_fields,
        })
    }
}

#[async_trait]
impl RegisterSchemaUseCase for StandardRegisterSchemaUseCase {
    async fn register(&self, ctx: &RequestContext, request: RegisterSchemaRequest) -> Result<RegisteredSchema, PolicyError> {
        match self.execute(&request).await {
            Ok(registered) => {
                if !registered.unresolved_owner_fields.is_empty() {
                    warn!(
                        trace_id = %ctx.trace_id,
                        schema_id = %request.schema_id,
                        fields = ?registered.unresolved_owner_fields,
                        "Schema fields registered without a resolvable owner"
                    );
                }
                info!(
                    trace_id = %ctx.trace_id,
                    schema_id = %request.schema_id,
                    provider_id = %request.provider_id,
                    records = registered.records.len(),
                    "Registered schema"
                );
                self.audit.emit(PolicyEvent::SchemaRegistered {
                    trace_id: ctx.trace_id.clone(),
                    schema_id: request.schema_id,
                    provider_id: request.provider_id,
                    field_count: registered.records.len(),
                    unresolved_owner_fields: registered.unresolved_owner_fields.clone(),
                    registered_at: Utc::now(),
                });
                Ok(registered)
            }
            Err(e) => {
                error!(trace_id = %ctx.trace_id, schema_id = %request.schema_id, error = %e, "Failed to register schema");
                self.audit.emit(PolicyEvent::MetadataReplaceFailed {
                    trace_id: ctx.trace_id.clone(),
                    schema_id: request.schema_id,
                    reason: e.kind().to_string(),
                    message: e.to_string(),
                    failed_at: Utc::now(),
                });
                Err(e)
            }
        }
    }
}
