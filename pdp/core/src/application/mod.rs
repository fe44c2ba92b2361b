// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod decide_access;
pub mod register_schema;
pub mod replace_policy_metadata;
pub mod repository_factory;
pub mod update_allow_list;

// Re-export use cases for convenience
pub use decide_access::{DecideAccessRequest, DecideAccessUseCase, StandardDecideAccessUseCase};
pub use register_schema::{RegisterSchemaRequest, RegisterSchemaUseCase, RegisteredSchema, StandardRegisterSchemaUseCase};
pub use replace_policy_metadata::{
    ReplacePolicyMetadataRequest, ReplacePolicyMetadataUseCase, StandardReplacePolicyMetadataUseCase,
};
pub use update_allow_list::{GrantedField, StandardUpdateAllowListUseCase, UpdateAllowListRequest, UpdateAllowListUseCase};

use uuid::Uuid;

/// Per-request correlation data threaded through every use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub trace_id: String,
}

impl RequestContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self { trace_id: trace_id.into() }
    }

    /// Context with a freshly generated trace id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::generate()
    }
}

pub(crate) fn require_non_empty(value: &str, name: &str) -> Result<(), crate::domain::policy::PolicyError> {
    if value.trim().is_empty() {
        return Err(crate::domain::policy::PolicyError::InvalidArgument(format!("{} is required", name)));
    }
    Ok(())
}

pub(crate) fn validate_field_refs(
    fields: &[crate::domain::policy::FieldRef],
    name: &str,
) -> Result<(), crate::domain::policy::PolicyError> {
    for (idx, field) in fields.iter().enumerate() {
        require_non_empty(&field.schema_id, &format!("{}[{}].schemaId", name, idx))?;
        require_non_empty(&field.field_name, &format!("{}[{}].fieldName", name, idx))?;
    }
    Ok(())
}
