// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Update Allow-List Use Case
//!
//! Grants (or renews) an application's time-bounded access to a batch of
//! fields. `expiresAt = now + grantDuration`; a renewal overwrites the previous
//! entry, it never stacks.
//!
//! The batch is all-or-nothing: an unknown duration fails with
//! `InvalidArgument` before any write, and a missing field fails the whole
//! batch with `NotFound`. Grants never create metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::application::{require_non_empty, validate_field_refs, RequestContext};
use crate::domain::events::PolicyEvent;
use crate::domain::policy::{AllowListEntry, FieldRef, GrantDuration, PolicyError};
use crate::domain::repository::FieldPolicyRepository;
use crate::infrastructure::audit::AuditSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAllowListRequest {
    pub application_id: String,
    /// `"30d"` (one calendar month) or `"365d"` (one calendar year)
    pub grant_duration: String,
    pub records: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantedField {
    pub field_name: String,
    pub schema_id: String,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait UpdateAllowListUseCase: Send + Sync {
    async fn grant(&self, ctx: &RequestContext, request: UpdateAllowListRequest) -> Result<Vec<GrantedField>, PolicyError>;
}

pub struct StandardUpdateAllowListUseCase {
    repository: Arc<dyn FieldPolicyRepository>,
    audit: Arc<dyn AuditSink>,
}

impl StandardUpdateAllowListUseCase {
    pub fn new(repository: Arc<dyn FieldPolicyRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, audit }
    }

    async fn execute(
        &self,
        request: &UpdateAllowListRequest,
        fields: &[FieldRef],
        now: DateTime<Utc>,
    ) -> Result<(GrantDuration, AllowListEntry, Vec<GrantedField>), PolicyError> {
        require_non_empty(&request.application_id, "applicationId")?;
        if fields.is_empty() {
            return Err(PolicyError::InvalidArgument("records must not be empty".to_string()));
        }
        validate_field_refs(fields, "records")?;
        let duration = request.grant_duration.parse::<GrantDuration>()?;
        let entry = AllowListEntry {
            expires_at: duration.expires_at(now)?,
            updated_at: now,
        };

        let updated = self.repository.grant(&request.application_id, fields, entry).await?;

        let granted = updated
            .iter()
            .map(|policy| GrantedField {
                field_name: policy.field_name.clone(),
                schema_id: policy.schema_id.clone(),
                expires_at: entry.expires_at,
                updated_at: entry.updated_at,
            })
            .collect();
        Ok((duration, entry, granted))
    }
}

#[async_trait]
impl UpdateAllowListUseCase for StandardUpdateAllowListUseCase {
    async fn grant(&self, ctx: &RequestContext, request: UpdateAllowListRequest) -> Result<Vec<GrantedField>, PolicyError> {
        let fields = FieldRef::dedup(&request.records);
        let now = Utc::now();

        match self.execute(&request, &fields, now).await {
            Ok((duration, entry, granted)) => {
                metrics::counter!("pdp_allowlist_grants_total").increment(granted.len() as u64);
                info!(
                    trace_id = %ctx.trace_id,
                    application_id = %request.application_id,
                    grant_duration = duration.as_str(),
                    fields = granted.len(),
                    expires_at = %entry.expires_at,
                    "Updated allow-list"
                );
                self.audit.emit(PolicyEvent::AllowListGranted {
                    trace_id: ctx.trace_id.clone(),
                    application_id: request.application_id,
                    grant_duration: duration,
                    fields,
                    expires_at: entry.expires_at,
                    granted_at: now,
                });
                Ok(granted)
            }
            Err(e) => {
                error!(
                    trace_id = %ctx.trace_id,
                    application_id = %request.application_id,
                    error = %e,
                    "Failed to update allow-list"
                );
                self.audit.emit(PolicyEvent::AllowListGrantFailed {
                    trace_id: ctx.trace_id.clone(),
                    application_id: request.application_id,
                    fields,
                    reason: e.kind().to_string(),
                    message: e.to_string(),
                    failed_at: Utc::now(),
                });
                Err(e)
            }
        }
    }
}
