// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::policy::{FieldRef, GrantDuration};

/// Outcome events of Policy Decision Point operations, shipped to the audit
/// sink after the operation has produced its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicyEvent {
    DecisionEvaluated {
        trace_id: String,
        application_id: String,
        requested_fields: Vec<FieldRef>,
        app_authorized: bool,
        app_access_expired: bool,
        app_requires_owner_consent: bool,
        unauthorized_fields: usize,
        expired_fields: usize,
        consent_required_fields: usize,
        evaluated_at: DateTime<Utc>,
    },
    DecisionFailed {
        trace_id: String,
        application_id: String,
        requested_fields: Vec<FieldRef>,
        reason: String, // "invalid_argument", "not_found", "db_error"
        message: String,
        failed_at: DateTime<Utc>,
    },
    MetadataReplaced {
        trace_id: String,
        schema_id: String,
        field_count: usize,
        replaced_at: DateTime<Utc>,
    },
    MetadataReplaceFailed {
        trace_id: String,
        schema_id: String,
        reason: String,
        message: String,
        failed_at: DateTime<Utc>,
    },
    AllowListGranted {
        trace_id: String,
        application_id: String,
        grant_duration: GrantDuration,
        fields: Vec<FieldRef>,
        expires_at: DateTime<Utc>,
        granted_at: DateTime<Utc>,
    },
    AllowListGrantFailed {
        trace_id: String,
        application_id: String,
        fields: Vec<FieldRef>,
        reason: String,
        message: String,
        failed_at: DateTime<Utc>,
    },
    SchemaRegistered {
        trace_id: String,
        schema_id: String,
        provider_id: String,
        field_count: usize,
        unresolved_owner_fields: Vec<String>,
        registered_at: DateTime<Utc>,
    },
}

impl PolicyEvent {
    pub fn trace_id(&self) -> &str {
        match self {
            PolicyEvent::DecisionEvaluated { trace_id, .. }
            | PolicyEvent::DecisionFailed { trace_id, .. }
            | PolicyEvent::MetadataReplaced { trace_id, .. }
            | PolicyEvent::MetadataReplaceFailed { trace_id, .. }
            | PolicyEvent::AllowListGranted { trace_id, .. }
            | PolicyEvent::AllowListGrantFailed { trace_id, .. }
            | PolicyEvent::SchemaRegistered { trace_id, .. } => trace_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PolicyEvent::DecisionEvaluated { evaluated_at, .. } => *evaluated_at,
            PolicyEvent::MetadataReplaced { replaced_at, .. } => *replaced_at,
            PolicyEvent::AllowListGranted { granted_at, .. } => *granted_at,
            PolicyEvent::SchemaRegistered { registered_at, .. } => *registered_at,
            PolicyEvent::DecisionFailed { failed_at, .. }
            | PolicyEvent::MetadataReplaceFailed { failed_at, .. }
            | PolicyEvent::AllowListGrantFailed { failed_at, .. } => *failed_at,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            PolicyEvent::DecisionFailed { .. }
                | PolicyEvent::MetadataReplaceFailed { .. }
                | PolicyEvent::AllowListGrantFailed { .. }
        )
    }

    pub fn is_decision(&self) -> bool {
        matches!(self, PolicyEvent::DecisionEvaluated { .. } | PolicyEvent::DecisionFailed { .. })
    }
}
