// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire types of the HTTP API, shared with `pdp-sdk`.

use serde::{Deserialize, Serialize};

pub use crate::application::{
    DecideAccessRequest, GrantedField, RegisterSchemaRequest, RegisteredSchema, ReplacePolicyMetadataRequest,
    UpdateAllowListRequest,
};
pub use crate::domain::decision::{DecisionField, PolicyDecision};
pub use crate::domain::policy::{FieldPolicy, FieldPolicyRecord, FieldRef};
pub use crate::domain::schema::{ConvertedField, OwnerResolution};

/// `POST /policy/metadata` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMetadataResponse {
    pub records: Vec<FieldPolicy>,
}

/// `POST /policy/update-allowlist` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListUpdateResponse {
    pub records: Vec<GrantedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
