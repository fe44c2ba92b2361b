// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Field Policy Repository
//!
//! `FieldPolicyRepository` backed by the `policy_metadata` table. Enum columns
//! are stored as text guarded by CHECK constraints; the allow-list is a JSONB
//! object keyed by application id.
//!
//! Writes run in one transaction each. Dropping the future before `commit`
//! drops the transaction, which rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::policy::{
    AccessControlType, AllowList, AllowListEntry, FieldPolicy, FieldPolicyId, FieldPolicyRecord, FieldRef, Owner,
    SchemaReplacement, Source,
};
use crate::domain::repository::{FieldPolicyRepository, RepositoryError};

const COLUMNS: &str = "id, schema_id, field_name, display_name, description, source, is_owner, \
                       access_control_type, allow_list, owner, created_at, updated_at";

pub struct PostgresFieldPolicyRepository {
    pool: PgPool,
}

impl PostgresFieldPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_policy(row: &PgRow) -> Result<FieldPolicy, RepositoryError> {
    let id: Uuid = row.try_get("id")?;
    let source: String = row.try_get("source")?;
    let access_control_type: String = row.try_get("access_control_type")?;
    let allow_list: serde_json::Value = row.try_get("allow_list")?;
    let owner: Option<String> = row.try_get("owner")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let source = source
        .parse::<Source>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let access_control_type = access_control_type
        .parse::<AccessControlType>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let allow_list: AllowList = serde_json::from_value(allow_list)
        .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize allow_list: {}", e)))?;

    Ok(FieldPolicy {
        id: FieldPolicyId(id),
        schema_id: row.try_get("schema_id")?,
        field_name: row.try_get("field_name")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        source,
        is_owner: row.try_get("is_owner")?,
        access_control_type,
        allow_list,
        owner: owner.map(Owner::new),
        created_at,
        updated_at,
    })
}

#[async_trait]
impl FieldPolicyRepository for PostgresFieldPolicyRepository {
    async fn replace_schema_fields(
        &self,
        schema_id: &str,
        records: &[FieldPolicyRecord],
    ) -> Result<Vec<FieldPolicy>, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Serializes replacements of one schema; the later commit wins.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(schema_id)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM policy_metadata WHERE schema_id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(schema_id)
        .fetch_all(&mut *tx)
        .await?;
        let existing = rows.iter().map(row_to_policy).collect::<Result<Vec<_>, _>>()?;

        let plan = SchemaReplacement::plan(schema_id, existing, records, Utc::now())?;
        if plan.is_noop() {
            return Ok(plan.into_records());
        }

        if !plan.deleted.is_empty() {
            let ids: Vec<Uuid> = plan.deleted.iter().map(|p| p.id.0).collect();
            sqlx::query("DELETE FROM policy_metadata WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryError::Database(format!("Failed to delete omitted fields: {}", e)))?;
        }

        for policy in &plan.inserted {
            let allow_list = serde_json::to_value(&policy.allow_list)?;
            sqlx::query(
                r#"
                INSERT INTO policy_metadata (
                    id, schema_id, field_name, display_name, description, source,
                    is_owner, access_control_type, allow_list, owner, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(policy.id.0)
            .bind(&policy.schema_id)
            .bind(&policy.field_name)
            .bind(&policy.display_name)
            .bind(&policy.description)
            .bind(policy.source.as_str())
            .bind(policy.is_owner)
            .bind(policy.access_control_type.as_str())
            .bind(allow_list)
            .bind(policy.owner.as_ref().map(|o| o.as_str().to_string()))
            .bind(policy.created_at)
            .bind(policy.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to insert {}: {}", policy.field_name, e)))?;
        }

        for policy in &plan.updated {
            sqlx::query(
                r#"
                UPDATE policy_metadata SET
                    display_name = $2,
                    description = $3,
                    source = $4,
                    is_owner = $5,
                    access_control_type = $6,
                    owner = $7,
                    updated_at = $8
                WHERE id = $1
                "#,
            )
            .bind(policy.id.0)
            .bind(&policy.display_name)
            .bind(&policy.description)
            .bind(policy.source.as_str())
            .bind(policy.is_owner)
            .bind(policy.access_control_type.as_str())
            .bind(policy.owner.as_ref().map(|o| o.as_str().to_string()))
            .bind(policy.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to update {}: {}", policy.field_name, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to commit schema replacement: {}", e)))?;

        tracing::debug!(
            schema_id,
            inserted = plan.inserted.len(),
            updated = plan.updated.len(),
            deleted = plan.deleted.len(),
            "Replaced schema fields"
        );

        Ok(plan.into_records())
    }

    async fn get(&self, schema_id: &str, field_name: &str) -> Result<FieldPolicy, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM policy_metadata WHERE schema_id = $1 AND field_name = $2",
            COLUMNS
        ))
        .bind(schema_id)
        .bind(field_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        match row {
            Some(row) => row_to_policy(&row),
            None => Err(RepositoryError::missing_field(&FieldRef::new(schema_id, field_name))),
        }
    }

    async fn batch_get(&self, fields: &[FieldRef]) -> Result<Vec<FieldPolicy>, RepositoryError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let schema_ids: Vec<&str> = fields.iter().map(|f| f.schema_id.as_str()).collect();
        let field_names: Vec<&str> = fields.iter().map(|f| f.field_name.as_str()).collect();

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM policy_metadata
            WHERE (schema_id, field_name) IN (
                SELECT * FROM UNNEST($1::text[], $2::text[])
            )
            "#,
            COLUMNS
        ))
        .bind(&schema_ids)
        .bind(&field_names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut found: HashMap<FieldRef, FieldPolicy> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let policy = row_to_policy(row)?;
            found.insert(policy.field_ref(), policy);
        }

        fields
            .iter()
            .map(|f| found.get(f).cloned().ok_or_else(|| RepositoryError::missing_field(f)))
            .collect()
    }

    async fn grant(
        &self,
        application_id: &str,
        fields: &[FieldRef],
        entry: AllowListEntry,
    ) -> Result<Vec<FieldPolicy>, RepositoryError> {
        let entry_json = serde_json::to_value(entry)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to begin transaction: {}", e)))?;

        let mut updated = Vec::with_capacity(fields.len());
        for field in fields {
            // jsonb_set touches only this application's key
            let row = sqlx::query(&format!(
                r#"
                UPDATE policy_metadata
                SET allow_list = jsonb_set(allow_list, ARRAY[$3::text], $4::jsonb, true),
                    updated_at = $5
                WHERE schema_id = $1 AND field_name = $2
                RETURNING {}
                "#,
                COLUMNS
            ))
            .bind(&field.schema_id)
            .bind(&field.field_name)
            .bind(application_id)
            .bind(&entry_json)
            .bind(entry.updated_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to update allow_list: {}", e)))?;

            match row {
                Some(row) => updated.push(row_to_policy(&row)?),
                None => return Err(RepositoryError::missing_field(field)),
            }
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to commit allow-list grant: {}", e)))?;

        Ok(updated)
    }
}
