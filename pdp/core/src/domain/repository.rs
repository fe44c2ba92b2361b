// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the [`FieldPolicy`] aggregate. The trait lives in
//! the domain layer and is implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `FieldPolicyRepository` | `FieldPolicy` | `InMemoryFieldPolicyRepository`, `PostgresFieldPolicyRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The implementation is selected at startup from `spec.database.backend` in
//! `pdp-config.yaml`. The in-memory store serves tests and local runs;
//! PostgreSQL serves production.
//!
//! Every write is all-or-nothing: a failure (or a dropped future) leaves the
//! store exactly as it was before the call.

use async_trait::async_trait;

use crate::domain::policy::{AllowListEntry, FieldPolicy, FieldPolicyRecord, FieldRef, PolicyError};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for FieldPolicy aggregates
#[async_trait]
pub trait FieldPolicyRepository: Send + Sync {
    /// Replace the full field set of `schema_id` in one transaction.
    ///
    /// Existing fields are updated in place with their allow-list preserved,
    /// new fields are inserted with an empty allow-list, and stored fields
    /// missing from `records` are deleted. Returns the resulting records in
    /// submission order.
    async fn replace_schema_fields(
        &self,
        schema_id: &str,
        records: &[FieldPolicyRecord],
    ) -> Result<Vec<FieldPolicy>, RepositoryError>;

    /// Point lookup. `NotFound` if absent.
    async fn get(&self, schema_id: &str, field_name: &str) -> Result<FieldPolicy, RepositoryError>;

    /// Fetch many pairs in one round trip, preserving request order.
    /// Fails with `NotFound` naming the first missing pair.
    async fn batch_get(&self, fields: &[FieldRef]) -> Result<Vec<FieldPolicy>, RepositoryError>;

    /// Set `allow_list[application_id] = entry` on every listed field in one
    /// transaction. Fails with `NotFound` (and writes nothing) if any field is
    /// missing. Returns the updated records in request order.
    async fn grant(
        &self,
        application_id: &str,
        fields: &[FieldRef],
        entry: AllowListEntry,
    ) -> Result<Vec<FieldPolicy>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RepositoryError {
    pub fn missing_field(field: &FieldRef) -> Self {
        RepositoryError::NotFound(format!("policy metadata not found for {}", field))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<PolicyError> for RepositoryError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidArgument(msg) => RepositoryError::Validation(msg),
            PolicyError::NotFound(msg) => RepositoryError::NotFound(msg),
            PolicyError::Internal(msg) => RepositoryError::Unknown(msg),
        }
    }
}
