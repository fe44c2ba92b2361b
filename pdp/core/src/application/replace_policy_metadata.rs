// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Replace Policy Metadata Use Case
//!
//! Replaces the complete field set of one schema.
//!
//! # Flow
//!
//! 1. Validate the request (schema id, owner invariant, unique field names)
//! 2. `FieldPolicyRepository::replace_schema_fields` in one transaction
//! 3. Emit `PolicyEvent::MetadataReplaced` (or `MetadataReplaceFailed`)
//!
//! Validation failures are returned before the store is touched.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::application::{require_non_empty, RequestContext};
use crate::domain::events::PolicyEvent;
use crate::domain::policy::{validate_records, FieldPolicy, FieldPolicyRecord, PolicyError};
use crate::domain::repository::FieldPolicyRepository;
use crate::infrastructure::audit::AuditSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePolicyMetadataRequest {
    pub schema_id: String,
    pub records: Vec<FieldPolicyRecord>,
}

#[async_trait]
pub trait ReplacePolicyMetadataUseCase: Send + Sync {
    /// Returns the resulting records in submission order.
    async fn replace(
        &self,
        ctx: &RequestContext,
        request: ReplacePolicyMetadataRequest,
    ) -> Result<Vec<FieldPolicy>, PolicyError>;
}

pub struct StandardReplacePolicyMetadataUseCase {
    repository: Arc<dyn FieldPolicyRepository>,
    audit: Arc<dyn AuditSink>,
}

impl StandardReplacePolicyMetadataUseCase {
    pub fn new(repository: Arc<dyn FieldPolicyRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, audit }
    }

    async fn execute(&self, request: &ReplacePolicyMetadataRequest) -> Result<Vec<FieldPolicy>, PolicyError> {
        require_non_empty(&request.schema_id, "schemaId")?;
        validate_records(&request.records)?;

        let records = self
            .repository
            .replace_schema_fields(&request.schema_id, &request.records)
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl ReplacePolicyMetadataUseCase for StandardReplacePolicyMetadataUseCase {
    async fn replace(
        &self,
        ctx: &RequestContext,
        request: ReplacePolicyMetadataRequest,
    ) -> Result<Vec<FieldPolicy>, PolicyError> {
        match self.execute(&request).await {
            Ok(records) => {
                info!(
                    trace_id = %ctx.trace_id,
                    schema_id = %request.schema_id,
                    records = records.len(),
                    "Replaced policy metadata"
                );
                self.audit.emit(PolicyEvent::MetadataReplaced {
                    trace_id: ctx.trace_id.clone(),
                    schema_id: request.schema_id,
                    field_count: records.len(),
                    replaced_at: Utc::now(),
                });
                Ok(records)
            }
            Err(e) => {
                error!(trace_id = %ctx.trace_id, schema_id = %request.schema_id, error = %e, "Failed to replace policy metadata");
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
