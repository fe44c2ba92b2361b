// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Field Policy Aggregate
//!
//! One [`FieldPolicy`] exists per `(schema_id, field_name)` pair. It carries the
//! ownership attributes the decision engine reads (`is_owner`, `owner`,
//! `access_control_type`) and the time-bounded [`AllowList`] of applications
//! that were granted access to the field.
//!
//! ## Owner invariant
//!
//! `is_owner == true` ⟺ `owner == None`. Every constructor and mutator goes
//! through [`validate_owner`], and the PostgreSQL table repeats the rule as a
//! CHECK constraint.
//!
//! ## Schema replacement
//!
//! A schema submission replaces the whole field set of that schema.
//! [`SchemaReplacement::plan`] computes the insert / update / delete sets from
//! the stored rows so that every repository backend applies exactly the same
//! semantics inside its own transaction.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::repository::RepositoryError;

/// Error taxonomy shared by every Policy Decision Point operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Malformed or missing request data. Always raised before any mutation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced `(schema_id, field_name)` pair has no stored policy.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store connectivity or commit failure. Details are logged, not echoed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PolicyError {
    /// Stable label used for metrics and audit payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::InvalidArgument(_) => "invalid_argument",
            PolicyError::NotFound(_) => "not_found",
            PolicyError::Internal(_) => "db_error",
        }
    }
}

impl From<RepositoryError> for PolicyError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => PolicyError::NotFound(msg),
            RepositoryError::Validation(msg) => PolicyError::InvalidArgument(msg),
            other => PolicyError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPolicyId(pub Uuid);

impl FieldPolicyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FieldPolicyId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessControlType {
    Public,
    #[default]
    Restricted,
}

impl AccessControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessControlType::Public => "public",
            AccessControlType::Restricted => "restricted",
        }
    }
}

impl FromStr for AccessControlType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AccessControlType::Public),
            "restricted" => Ok(AccessControlType::Restricted),
            other => Err(PolicyError::InvalidArgument(format!(
                "unknown access control type '{}'",
                other
            ))),
        }
    }
}

/// Provenance of a field value. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Primary,
    #[default]
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Fallback => "fallback",
        }
    }
}

impl FromStr for Source {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Source::Primary),
            "fallback" => Ok(Source::Fallback),
            other => Err(PolicyError::InvalidArgument(format!("unknown source '{}'", other))),
        }
    }
}

/// Identity of the canonical data owner of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    /// The citizen the record describes.
    pub const CITIZEN: &'static str = "citizen";
    /// Reserved identity for owners that could not be resolved from a schema.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn citizen() -> Self {
        Self::new(Self::CITIZEN)
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schema-qualified field identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub schema_id: String,
    pub field_name: String,
}

impl FieldRef {
    pub fn new(schema_id: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            field_name: field_name.into(),
        }
    }

    /// Removes repeated pairs, keeping the first occurrence of each.
    pub fn dedup(fields: &[FieldRef]) -> Vec<FieldRef> {
        let mut seen = HashSet::with_capacity(fields.len());
        fields
            .iter()
            .filter(|f| seen.insert((*f).clone()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema_id {} and field_name {}", self.schema_id, self.field_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowListEntry {
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AllowListEntry {
    /// Access is expired strictly after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Application id → grant. Keys are unique per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AllowList(HashMap<String, AllowListEntry>);

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, application_id: &str) -> Option<&AllowListEntry> {
        self.0.get(application_id)
    }

    /// Sets or overwrites the entry for `application_id`.
    pub fn grant(&mut self, application_id: impl Into<String>, entry: AllowListEntry) -> Option<AllowListEntry> {
        self.0.insert(application_id.into(), entry)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AllowListEntry)> {
        self.0.iter()
    }
}

/// Renewal period of an allow-list grant. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantDuration {
    #[serde(rename = "30d")]
    OneMonth,
    #[serde(rename = "365d")]
    OneYear,
}

impl GrantDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantDuration::OneMonth => "30d",
            GrantDuration::OneYear => "365d",
        }
    }

    /// Calendar arithmetic: months are added, clamping to the last day of the
    /// target month (Jan 31 + one month = Feb 28/29).
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, PolicyError> {
        let months = match self {
            GrantDuration::OneMonth => Months::new(1),
            GrantDuration::OneYear => Months::new(12),
        };
        now.checked_add_months(months).ok_or_else(|| {
            PolicyError::InvalidArgument(format!("grant duration {} overflows from {}", self.as_str(), now))
        })
    }
}

impl FromStr for GrantDuration {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30d" => Ok(GrantDuration::OneMonth),
            "365d" => Ok(GrantDuration::OneYear),
            other => Err(PolicyError::InvalidArgument(format!("invalid grant duration: {}", other))),
        }
    }
}

/// Checks the owner invariant of a field policy.
pub fn validate_owner(is_owner: bool, owner: Option<&Owner>) -> Result<(), PolicyError> {
    match (is_owner, owner) {
        (true, None) | (false, Some(_)) => Ok(()),
        _ => Err(PolicyError::InvalidArgument(
            "owner must be specified when isOwner is false and must be null when isOwner is true".to_string(),
        )),
    }
}

/// Incoming description of one field of a schema, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPolicyRecord {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Source,
    pub is_owner: bool,
    #[serde(default)]
    pub access_control_type: AccessControlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

impl FieldPolicyRecord {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.field_name.trim().is_empty() {
            return Err(PolicyError::InvalidArgument("fieldName is required".to_string()));
        }
        validate_owner(self.is_owner, self.owner.as_ref()).map_err(|e| match e {
            PolicyError::InvalidArgument(msg) => {
                PolicyError::InvalidArgument(format!("{}: {}", self.field_name, msg))
            }
            other => other,
        })
    }
}

/// Validates a whole replacement batch: every record individually, then
/// uniqueness of field names.
pub fn validate_records(records: &[FieldPolicyRecord]) -> Result<(), PolicyError> {
    let mut names = HashSet::with_capacity(records.len());
    for record in records {
        record.validate()?;
        if !names.insert(record.field_name.as_str()) {
            return Err(PolicyError::InvalidArgument(format!(
                "duplicate fieldName '{}' in request",
                record.field_name
            )));
        }
    }
    Ok(())
}

/// Stored access-control record for one field within one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPolicy {
    pub id: FieldPolicyId,
    pub schema_id: String,
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: Source,
    pub is_owner: bool,
    pub access_control_type: AccessControlType,
    pub allow_list: AllowList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldPolicy {
    /// Builds a new policy with an empty allow-list.
    pub fn from_record(
        schema_id: impl Into<String>,
        record: &FieldPolicyRecord,
        now: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        record.validate()?;
        Ok(Self {
            id: FieldPolicyId::new(),
            schema_id: schema_id.into(),
            field_name: record.field_name.clone(),
            display_name: record.display_name.clone(),
            description: record.description.clone(),
            source: record.source,
            is_owner: record.is_owner,
            access_control_type: record.access_control_type,
            allow_list: AllowList::new(),
            owner: record.owner.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef::new(&self.schema_id, &self.field_name)
    }

    /// Consent is re-derived from the stored ownership pair on every call.
    pub fn requires_owner_consent(&self) -> bool {
        !self.is_owner && self.access_control_type == AccessControlType::Restricted
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        validate_owner(self.is_owner, self.owner.as_ref())
    }

    fn matches_record(&self, record: &FieldPolicyRecord) -> bool {
        self.display_name == record.display_name
            && self.description == record.description
            && self.source == record.source
            && self.is_owner == record.is_owner
            && self.access_control_type == record.access_control_type
            && self.owner == record.owner
    }

    /// Overwrites the descriptive and ownership attributes, keeping the
    /// allow-list. Returns `false` when nothing changed, in which case
    /// `updated_at` is left untouched.
    pub fn apply_record(&mut self, record: &FieldPolicyRecord, now: DateTime<Utc>) -> Result<bool, PolicyError> {
        record.validate()?;
        if self.matches_record(record) {
            return Ok(false);
        }
        self.display_name = record.display_name.clone();
        self.description = record.description.clone();
        self.source = record.source;
        self.is_owner = record.is_owner;
        self.access_control_type = record.access_control_type;
        self.owner = record.owner.clone();
        self.updated_at = now;
        Ok(true)
    }

    /// Sets or overwrites `application_id`'s grant.
    pub fn grant(&mut self, application_id: &str, entry: AllowListEntry) {
        self.allow_list.grant(application_id, entry);
        self.updated_at = entry.updated_at;
    }
}

/// Insert / update / delete sets for replacing the field set of one schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaReplacement {
    pub inserted: Vec<FieldPolicy>,
    pub updated: Vec<FieldPolicy>,
    pub unchanged: Vec<FieldPolicy>,
    pub deleted: Vec<FieldPolicy>,
    order: Vec<String>,
}

impl SchemaReplacement {
    /// Plans the replacement of `existing` (all stored rows of `schema_id`) by
    /// `records`. Existing fields keep their id, `created_at` and allow-list.
    pub fn plan(
        schema_id: &str,
        existing: Vec<FieldPolicy>,
        records: &[FieldPolicyRecord],
        now: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        validate_records(records)?;

        let mut by_name: HashMap<String, FieldPolicy> = existing
            .into_iter()
            .filter(|p| p.schema_id == schema_id)
            .map(|p| (p.field_name.clone(), p))
            .collect();

        let mut plan = SchemaReplacement::default();
        for record in records {
            plan.order.push(record.field_name.clone());
            match by_name.remove(&record.field_name) {
                Some(mut current) => {
                    if current.apply_record(record, now)? {
                        plan.updated.push(current);
                    } else {
                        plan.unchanged.push(current);
                    }
                }
                None => plan.inserted.push(FieldPolicy::from_record(schema_id, record, now)?),
            }
        }

        let mut deleted: Vec<FieldPolicy> = by_name.into_values().collect();
        deleted.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        plan.deleted = deleted;

        Ok(plan)
    }

    /// True when applying the plan would not touch the store.
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// The resulting field set, in the order the records were submitted.
    pub fn into_records(self) -> Vec<FieldPolicy> {
        let mut by_name: HashMap<String, FieldPolicy> = self
            .inserted
            .into_iter()
            .chain(self.updated)
            .chain(self.unchanged)
            .map(|p| (p.field_name.clone(), p))
            .collect();
        self.order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, is_owner: bool, owner: Option<&str>) -> FieldPolicyRecord {
        FieldPolicyRecord {
            field_name: name.to_string(),
            display_name: None,
            description: None,
            source: Source::Primary,
            is_owner,
            access_control_type: AccessControlType::Restricted,
            owner: owner.map(Owner::new),
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_owner_invariant() {
        assert!(validate_owner(true, None).is_ok());
        assert!(validate_owner(false, Some(&Owner::citizen())).is_ok());
        assert!(matches!(validate_owner(true, Some(&Owner::citizen())), Err(PolicyError::InvalidArgument(_))));
        assert!(matches!(validate_owner(false, None), Err(PolicyError::InvalidArgument(_))));
    }

    #[test]
    fn test_record_validation_rejects_empty_and_duplicate_names() {
        assert!(record("", true, None).validate().is_err());

        let batch = vec![record("person.nic", true, None), record("person.nic", true, None)];
        let err = validate_records(&batch).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_grant_duration_calendar_arithmetic() {
        assert_eq!(GrantDuration::OneMonth.expires_at(at(2026, 3, 15)).unwrap(), at(2026, 4, 15));
        assert_eq!(GrantDuration::OneMonth.expires_at(at(2026, 1, 31)).unwrap(), at(2026, 2, 28));
        assert_eq!(GrantDuration::OneMonth.expires_at(at(2028, 1, 31)).unwrap(), at(2028, 2, 29));
        assert_eq!(GrantDuration::OneYear.expires_at(at(2026, 6, 1)).unwrap(), at(2027, 6, 1));
    }

    #[test]
    fn test_grant_duration_parsing() {
        assert_eq!("30d".parse::<GrantDuration>().unwrap(), GrantDuration::OneMonth);
        assert_eq!("365d".parse::<GrantDuration>().unwrap(), GrantDuration::OneYear);
        assert!(matches!("7d".parse::<GrantDuration>(), Err(PolicyError::InvalidArgument(_))));

        let json = serde_json::to_string(&GrantDuration::OneYear).unwrap();
        assert_eq!(json, "\"365d\"");
    }

    #[test]
    fn test_entry_expiry_is_strict() {
        let entry = AllowListEntry { expires_at: at(2026, 5, 1), updated_at: at(2026, 4, 1) };
        assert!(!entry.is_expired_at(at(2026, 5, 1)));
        assert!(entry.is_expired_at(at(2026, 5, 2)));
    }

    #[test]
    fn test_plan_preserves_allow_list_and_deletes_omitted() {
        let now = at(2026, 1, 1);
        let first = SchemaReplacement::plan(
            "schema-1",
            vec![],
            &[record("person.fullName", true, None), record("person.nic", false, Some("citizen"))],
            now,
        )
        .unwrap();
        assert_eq!(first.inserted.len(), 2);
        let mut stored = first.into_records();

        let entry = AllowListEntry { expires_at: at(2026, 2, 1), updated_at: now };
        stored[0].grant("app-1", entry);

        let later = at(2026, 1, 2);
        let mut changed = record("person.fullName", true, None);
        changed.description = Some("Full legal name".to_string());
        let second = SchemaReplacement::plan("schema-1", stored, &[changed], later).unwrap();

        assert_eq!(second.updated.len(), 1);
        assert_eq!(second.deleted.len(), 1);
        assert_eq!(second.deleted[0].field_name, "person.nic");

        let result = second.into_records();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].allow_list.get("app-1"), Some(&entry));
        assert_eq!(result[0].updated_at, later);
        assert_eq!(result[0].created_at, now);
    }

    #[test]
    fn test_plan_is_idempotent() {
        let records = vec![record("person.fullName", true, None), record("person.nic", false, Some("citizen"))];
        let stored = SchemaReplacement::plan("schema-1", vec![], &records, at(2026, 1, 1))
            .unwrap()
            .into_records();

        let replay = SchemaReplacement::plan("schema-1", stored.clone(), &records, at(2026, 1, 5)).unwrap();
        assert!(replay.is_noop());
        assert_eq!(replay.into_records(), stored);
    }

    #[test]
    fn test_plan_rejects_owner_violation() {
        let result = SchemaReplacement::plan("schema-1", vec![], &[record("person.nic", false, None)], at(2026, 1, 1));
        assert!(matches!(result, Err(PolicyError::InvalidArgument(_))));
    }

    #[test]
    fn test_consent_rule() {
        let now = at(2026, 1, 1);
        let owned = FieldPolicy::from_record("s", &record("person.fullName", true, None), now).unwrap();
        let foreign = FieldPolicy::from_record("s", &record("person.nic", false, Some("citizen")), now).unwrap();
        let mut public_foreign = record("person.city", false, Some("citizen"));
        public_foreign.access_control_type = AccessControlType::Public;
        let public_foreign = FieldPolicy::from_record("s", &public_foreign, now).unwrap();

        assert!(!owned.requires_owner_consent());
        assert!(foreign.requires_owner_consent());
        assert!(!public_foreign.requires_owner_consent());
    }
}
