// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Decision
//!
//! Pure evaluation of an application's access to a set of field policies.
//! Each field lands in exactly one [`FieldOutcome`]; precedence is missing
//! grant, then expiry, then consent. The rollups on [`PolicyDecision`] are
//! derived from the three outcome sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::policy::{FieldPolicy, Owner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldOutcome {
    /// No allow-list entry for the application.
    Unauthorized,
    /// Entry present, but `now > expiresAt`.
    Expired,
    /// Entry valid; the data owner must additionally consent.
    ConsentRequired,
    Authorized,
}

impl FieldOutcome {
    pub fn classify(policy: &FieldPolicy, application_id: &str, now: DateTime<Utc>) -> Self {
        match policy.allow_list.get(application_id) {
            None => FieldOutcome::Unauthorized,
            Some(entry) if entry.is_expired_at(now) => FieldOutcome::Expired,
            Some(_) if policy.requires_owner_consent() => FieldOutcome::ConsentRequired,
            Some(_) => FieldOutcome::Authorized,
        }
    }
}

/// Field descriptor returned inside a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionField {
    pub field_name: String,
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

impl From<&FieldPolicy> for DecisionField {
    fn from(policy: &FieldPolicy) -> Self {
        Self {
            field_name: policy.field_name.clone(),
            schema_id: policy.schema_id.clone(),
            display_name: policy.display_name.clone(),
            description: policy.description.clone(),
            owner: policy.owner.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub app_authorized: bool,
    pub unauthorized_fields: Vec<DecisionField>,
    pub app_access_expired: bool,
    pub expired_fields: Vec<DecisionField>,
    pub app_requires_owner_consent: bool,
    pub consent_required_fields: Vec<DecisionField>,
}

impl PolicyDecision {
    /// Evaluates `policies` in order. An empty slice is vacuously authorized.
    pub fn evaluate(application_id: &str, policies: &[FieldPolicy], now: DateTime<Utc>) -> Self {
        let mut decision = PolicyDecision::default();

        for policy in policies {
            match FieldOutcome::classify(policy, application_id, now) {
                FieldOutcome::Unauthorized => decision.unauthorized_fields.push(policy.into()),
                FieldOutcome::Expired => decision.expired_fields.push(policy.into()),
                FieldOutcome::ConsentRequired => decision.consent_required_fields.push(policy.into()),
                FieldOutcome::Authorized => {}
            }
        }

        decision.app_authorized = decision.unauthorized_fields.is_empty();
        decision.app_access_expired = !decision.expired_fields.is_empty();
        decision.app_requires_owner_consent = !decision.consent_required_fields.is_empty();
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{AccessControlType, AllowListEntry, FieldPolicyRecord, Source};
    use chrono::Duration;

    fn policy(name: &str, is_owner: bool, access: AccessControlType) -> FieldPolicy {
        let record = FieldPolicyRecord {
            field_name: name.to_string(),
            display_name: None,
            description: None,
            source: Source::Primary,
            is_owner,
            access_control_type: access,
            owner: if is_owner { None } else { Some(Owner::citizen()) },
        };
        FieldPolicy::from_record("drp-schema-v1", &record, Utc::now()).unwrap()
    }

    fn grant(policy: &mut FieldPolicy, app: &str, expires_at: DateTime<Utc>) {
        policy.grant(app, AllowListEntry { expires_at, updated_at: Utc::now() });
    }

    #[test]
    fn test_missing_entry_is_unauthorized() {
        let now = Utc::now();
        let full_name = policy("person.fullName", true, AccessControlType::Public);

        let decision = PolicyDecision::evaluate("passport-app", &[full_name], now);
        assert!(!decision.app_authorized);
        assert_eq!(decision.unauthorized_fields.len(), 1);
        assert_eq!(decision.unauthorized_fields[0].field_name, "person.fullName");
        assert!(!decision.app_access_expired);
        assert!(!decision.app_requires_owner_consent);
    }

    #[test]
    fn test_granted_restricted_foreign_field_requires_consent() {
        let now = Utc::now();
        let mut nic = policy("person.nic", false, AccessControlType::Restricted);
        grant(&mut nic, "passport-app", now + Duration::days(30));

        let decision = PolicyDecision::evaluate("passport-app", &[nic], now);
        assert!(decision.app_authorized);
        assert!(decision.app_requires_owner_consent);
        assert_eq!(decision.consent_required_fields[0].owner, Some(Owner::citizen()));
        assert!(decision.expired_fields.is_empty());
    }

    #[test]
    fn test_expired_takes_precedence_over_consent() {
        let now = Utc::now();
        let mut nic = policy("person.nic", false, AccessControlType::Restricted);
        grant(&mut nic, "passport-app", now - Duration::days(1));

        let decision = PolicyDecision::evaluate("passport-app", &[nic], now);
        assert!(decision.app_authorized);
        assert!(decision.app_access_expired);
        assert_eq!(decision.expired_fields.len(), 1);
        assert!(decision.consent_required_fields.is_empty());
        assert!(!decision.app_requires_owner_consent);
    }

    #[test]
    fn test_outcomes_are_mutually_exclusive() {
        let now = Utc::now();
        let mut owned = policy("person.fullName", true, AccessControlType::Public);
        let mut expired = policy("person.address", false, AccessControlType::Restricted);
        let mut consent = policy("person.nic", false, AccessControlType::Restricted);
        let missing = policy("person.photo", false, AccessControlType::Restricted);
        grant(&mut owned, "app", now + Duration::days(1));
        grant(&mut expired, "app", now - Duration::seconds(1));
        grant(&mut consent, "app", now + Duration::days(1));
        // a grant for a different application does not count
        let mut other = missing.clone();
        grant(&mut other, "other-app", now + Duration::days(1));

        let decision = PolicyDecision::evaluate("app", &[owned, expired, consent, other], now);
        let names = |fields: &[DecisionField]| fields.iter().map(|f| f.field_name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&decision.unauthorized_fields), vec!["person.photo"]);
        assert_eq!(names(&decision.expired_fields), vec!["person.address"]);
        assert_eq!(names(&decision.consent_required_fields), vec!["person.nic"]);
        assert!(!decision.app_authorized);
    }

    #[test]
    fn test_empty_request_is_vacuously_authorized() {
        let decision = PolicyDecision::evaluate("app", &[], Utc::now());
        assert!(decision.app_authorized);
        assert!(!decision.app_access_expired);
        assert!(!decision.app_requires_owner_consent);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let mut name = policy("person.fullName", true, AccessControlType::Public);
        grant(&mut name, "app", now);
        assert_eq!(FieldOutcome::classify(&name, "app", now), FieldOutcome::Authorized);
    }

    #[test]
    fn test_decision_wire_shape() {
        let json = serde_json::to_value(PolicyDecision::evaluate("app", &[], Utc::now())).unwrap();
        assert_eq!(json["appAuthorized"], true);
        assert!(json["unauthorizedFields"].as_array().unwrap().is_empty());
        assert!(json.get("consentRequiredFields").is_some());
    }
}
