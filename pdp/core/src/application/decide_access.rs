// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Decide Access Use Case
//!
//! Evaluates an application's read access to a list of schema-qualified
//! fields against the stored metadata. One batched store read per call; no
//! policy cache.
//!
//! A pair with no stored policy fails the whole call with `NotFound`. It is
//! never reported as an unauthorized field.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::application::{require_non_empty, validate_field_refs, RequestContext};
use crate::domain::decision::PolicyDecision;
use crate::domain::events::PolicyEvent;
use crate::domain::policy::{FieldRef, PolicyError};
use crate::domain::repository::FieldPolicyRepository;
use crate::infrastructure::audit::AuditSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideAccessRequest {
    pub application_id: String,
    pub required_fields: Vec<FieldRef>,
}

#[async_trait]
pub trait DecideAccessUseCase: Send + Sync {
    async fn decide(&self, ctx: &RequestContext, request: DecideAccessRequest) -> Result<PolicyDecision, PolicyError>;
}

pub struct StandardDecideAccessUseCase {
    repository: Arc<dyn FieldPolicyRepository>,
    audit: Arc<dyn AuditSink>,
}

impl StandardDecideAccessUseCase {
    pub fn new(repository: Arc<dyn FieldPolicyRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, audit }
    }

    async fn execute(&self, request: &DecideAccessRequest, fields: &[FieldRef]) -> Result<PolicyDecision, PolicyError> {
        require_non_empty(&request.application_id, "applicationId")?;
        validate_field_refs(fields, "requiredFields")?;

        let policies = self.repository.batch_get(fields).await?;
        Ok(PolicyDecision::evaluate(&request.application_id, &policies, Utc::now()))
    }
}

#[async_trait]
impl DecideAccessUseCase for StandardDecideAccessUseCase {
    async fn decide(&self, ctx: &RequestContext, request: DecideAccessRequest) -> Result<PolicyDecision, PolicyError> {
        let started = Instant::now();
        let fields = FieldRef::dedup(&request.required_fields);
        let result = self.execute(&request, &fields).await;
        metrics::histogram!("pdp_decision_latency_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(decision) => {
                debug!(
                    trace_id = %ctx.trace_id,
                    application_id = %request.application_id,
                    app_authorized = decision.app_authorized,
                    app_access_expired = decision.app_access_expired,
                    app_requires_owner_consent = decision.app_requires_owner_consent,
                    "Policy decision evaluated"
                );
                self.audit.emit(PolicyEvent::DecisionEvaluated {
                    trace_id: ctx.trace_id.clone(),
                    application_id: request.application_id,
                    requested_fields: fields,
                    app_authorized: decision.app_authorized,
                    app_access_expired: decision.app_access_expired,
                    app_requires_owner_consent: decision.app_requires_owner_consent,
                    unauthorized_fields: decision.unauthorized_fields.len(),
                    expired_fields: decision.expired_fields.len(),
                    consent_required_fields: decision.consent_required_fields.len(),
                    evaluated_at: Utc::now(),
                });
                Ok(decision)
            }
            Err(e) => {
                metrics::counter!("pdp_decision_failures_total", "reason" => e.kind()).increment(1);
                error!(
                    trace_id = %ctx.trace_id,
                    application_id = %request.application_id,
                    error = %e,
                    "Policy decision failed"
                );
                self.audit.emit(PolicyEvent::DecisionFailed {
                    trace_id: ctx.trace_id.clone(),
                    application_id: request.application_id,
                    requested_fields: fields,
                    reason: e.kind().to_string(),
                    message: e.to_string(),
                    failed_at: Utc::now(),
                });
                Err(e)
            }
        }
    }
}
