// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory
//!
//! Creates the concrete `FieldPolicyRepository` for the configured storage
//! backend, keeping the domain layer free of infrastructure types.

use std::sync::Arc;

use crate::domain::repository::{FieldPolicyRepository, StorageBackend};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{InMemoryFieldPolicyRepository, PostgresFieldPolicyRepository};

/// Creates a FieldPolicyRepository implementation based on the configured backend.
///
/// The PostgreSQL backend requires a connected `Database`.
pub fn create_field_policy_repository(
    backend: &StorageBackend,
    database: Option<&Database>,
) -> anyhow::Result<Arc<dyn FieldPolicyRepository>> {
    match (backend, database) {
        (StorageBackend::InMemory, _) => Ok(Arc::new(InMemoryFieldPolicyRepository::new())),
        (StorageBackend::PostgreSQL(_), Some(db)) => {
            Ok(Arc::new(PostgresFieldPolicyRepository::new(db.get_pool().clone())))
        }
        (StorageBackend::PostgreSQL(config), None) => {
            anyhow::bail!("PostgreSQL backend selected but not connected ({})", config.connection_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::PostgresConfig;

    #[test]
    fn test_postgres_backend_requires_database() {
        let backend = StorageBackend::PostgreSQL(PostgresConfig {
            connection_string: "postgres://pdp@localhost:5432/pdp".to_string(),
        });
        assert!(create_field_policy_repository(&backend, None).is_err());
        assert!(create_field_policy_repository(&StorageBackend::InMemory, None).is_ok());
    }
}
