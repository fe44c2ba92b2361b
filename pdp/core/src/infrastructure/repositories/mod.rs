// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of [`FieldPolicyRepository`].
//!
//! - **PostgresFieldPolicyRepository** - `policy_metadata` table, one
//!   transaction per write
//! - **InMemoryFieldPolicyRepository** - `parking_lot::RwLock` over a
//!   `HashMap`, for tests and local runs
//!
//! Both apply schema replacement through
//! [`SchemaReplacement::plan`](crate::domain::policy::SchemaReplacement::plan),
//! so they share insert / update / delete semantics.

pub mod postgres_field_policy;

pub use postgres_field_policy::PostgresFieldPolicyRepository;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::policy::{AllowListEntry, FieldPolicy, FieldPolicyRecord, FieldRef, SchemaReplacement};
use crate::domain::repository::{FieldPolicyRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryFieldPolicyRepository {
    policies: Arc<RwLock<HashMap<FieldRef, FieldPolicy>>>,
}

impl InMemoryFieldPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

#[async_trait]
impl FieldPolicyRepository for InMemoryFieldPolicyRepository {
    async fn replace_schema_fields(
        &self,
        schema_id: &str,
        records: &[FieldPolicyRecord],
    ) -> Result<Vec<FieldPolicy>, RepositoryError> {
        let mut policies = self.policies.write();

        let existing: Vec<FieldPolicy> = policies
            .values()
            .filter(|p| p.schema_id == schema_id)
            .cloned()
            .collect();
        let plan = SchemaReplacement::plan(schema_id, existing, records, Utc::now())?;

        for removed in &plan.deleted {
            policies.remove(&removed.field_ref());
        }
        let result = plan.into_records();
        for policy in &result {
            policies.insert(policy.field_ref(), policy.clone());
        }

        Ok(result)
    }

    async fn get(&self, schema_id: &str, field_name: &str) -> Result<FieldPolicy, RepositoryError> {
        let key = FieldRef::new(schema_id, field_name);
        self.policies
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| RepositoryError::missing_field(&key))
    }

    async fn batch_get(&self, fields: &[FieldRef]) -> Result<Vec<FieldPolicy>, RepositoryError> {
        let policies = self.policies.read();
        fields
            .iter()
            .map(|f| policies.get(f).cloned().ok_or_else(|| RepositoryError::missing_field(f)))
            .collect()
    }

    async fn grant(
        &self,
        application_id: &str,
        fields: &[FieldRef],
        entry: AllowListEntry,
    ) -> Result<Vec<FieldPolicy>, RepositoryError> {
        let mut policies = self.policies.write();

        // all-or-nothing: check every field before mutating any
        if let Some(missing) = fields.iter().find(|f| !policies.contains_key(*f)) {
            return Err(RepositoryError::missing_field(missing));
        }

        let mut updated = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(policy) = policies.get_mut(field) {
                policy.grant(application_id, entry);
                updated.push(policy.clone());
            }
        }
        Ok(updated)
    }
}
