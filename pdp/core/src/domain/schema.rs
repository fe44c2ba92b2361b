// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Schema Conversion
//!
//! Turns parsed [`FieldDirective`]s into [`FieldPolicyRecord`]s for one
//! provider submission.
//!
//! Owner resolution, first match wins:
//!
//! 1. out-of-band override keyed by dotted path (`person.nic`)
//! 2. `@owner(value: "...")` annotation
//! 3. `@isOwner(value: true)` resolves to the submitting provider
//! 4. unresolved
//!
//! An unresolved owner is never defaulted to the provider. It is stored as
//! [`Owner::UNKNOWN`] with `is_owner = false`, so a restricted field without a
//! known owner always requires consent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::policy::{AccessControlType, FieldPolicyRecord, Owner, Source};

/// One annotated field line of a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDirective {
    pub name: String,
    pub field_type: String,
    pub parent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub is_owner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl FieldDirective {
    /// `lower(parentType).name`, e.g. `person.fullName`.
    pub fn field_path(&self) -> String {
        format!("{}.{}", self.parent_type.to_lowercase(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OwnerResolution {
    Override,
    Annotation,
    Provider,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedField {
    pub field_name: String,
    pub owner_resolution: OwnerResolution,
    pub consent_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaConversion {
    pub records: Vec<FieldPolicyRecord>,
    pub fields: Vec<ConvertedField>,
}

impl SchemaConversion {
    pub fn unresolved_owner_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.owner_resolution == OwnerResolution::Unresolved)
            .map(|f| f.field_name.clone())
            .collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Converts `directives` submitted by `provider_id` into field records.
pub fn convert_directives(
    directives: &[FieldDirective],
    provider_id: &str,
    field_owners: &HashMap<String, String>,
) -> SchemaConversion {
    let mut conversion = SchemaConversion::default();

    for directive in directives {
        let path = directive.field_path();

        let (resolved, resolution) = if let Some(owner) = non_empty(field_owners.get(&path).map(String::as_str)) {
            (Some(owner.to_string()), OwnerResolution::Override)
        } else if let Some(owner) = non_empty(directive.owner.as_deref()) {
            (Some(owner.to_string()), OwnerResolution::Annotation)
        } else if directive.is_owner {
            (Some(provider_id.to_string()), OwnerResolution::Provider)
        } else {
            (None, OwnerResolution::Unresolved)
        };

        let access_control_type = directive
            .access_control
            .as_deref()
            .and_then(|v| v.parse::<AccessControlType>().ok())
            .unwrap_or_default();
        let source = directive
            .source
            .as_deref()
            .and_then(|v| v.parse::<Source>().ok())
            .unwrap_or_default();

        let is_owner = resolved.as_deref() == Some(provider_id);
        let owner = if is_owner {
            None
        } else {
            Some(resolved.map(Owner::new).unwrap_or_else(Owner::unknown))
        };
        let consent_required = access_control_type == AccessControlType::Restricted && !is_owner;

        conversion.fields.push(ConvertedField {
            field_name: path.clone(),
            owner_resolution: resolution,
            consent_required,
        });
        conversion.records.push(FieldPolicyRecord {
            field_name: path,
            display_name: non_empty(directive.display_name.as_deref()).map(str::to_string),
            description: non_empty(directive.description.as_deref()).map(str::to_string),
            source,
            is_owner,
            access_control_type,
            owner,
        });
    }

    conversion
}
