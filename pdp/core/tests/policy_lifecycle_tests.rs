// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use pdp_core::application::{
    DecideAccessRequest, DecideAccessUseCase, RegisterSchemaRequest, RegisterSchemaUseCase,
    ReplacePolicyMetadataRequest, ReplacePolicyMetadataUseCase, RequestContext, StandardDecideAccessUseCase,
    StandardRegisterSchemaUseCase, StandardReplacePolicyMetadataUseCase, StandardUpdateAllowListUseCase,
    UpdateAllowListRequest, UpdateAllowListUseCase,
};
use pdp_core::domain::events::PolicyEvent;
use pdp_core::domain::policy::{AllowListEntry, FieldRef, Owner, PolicyError};
use pdp_core::domain::repository::FieldPolicyRepository;
use pdp_core::domain::schema::OwnerResolution;
use pdp_core::infrastructure::audit::AuditSink;
use pdp_core::infrastructure::repositories::InMemoryFieldPolicyRepository;
use std::collections::HashMap;
use std::sync::Arc;

const SCHEMA_ID: &str = "drp-schema-v1";
const PROVIDER: &str = "drp";
const APP: &str = "passport-app";

const SDL: &str = r#"
type Query {
  person(nic: String!): Person
}

type Person {
  fullName: String @accessControl(type: "public") @source(value: "primary") @isOwner(value: true)
  nic: String @accessControl(type: "restricted") @source(value: "primary") @isOwner(value: false) @owner(value: "citizen")
  photo: String @accessControl(type: "restricted") @source(value: "fallback")
}
"#;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<PolicyEvent>>,
}

impl AuditSink for RecordingSink {
    fn emit(&self, event: PolicyEvent) {
        self.events.lock().push(event);
    }
}

struct Pdp {
    repository: Arc<InMemoryFieldPolicyRepository>,
    audit: Arc<RecordingSink>,
    register: StandardRegisterSchemaUseCase,
    replace: StandardReplacePolicyMetadataUseCase,
    grant: StandardUpdateAllowListUseCase,
    decide: StandardDecideAccessUseCase,
}

impl Pdp {
    fn new() -> Self {
        let repository = Arc::new(InMemoryFieldPolicyRepository::new());
        let audit = Arc::new(RecordingSink::default());
        let repo: Arc<dyn FieldPolicyRepository> = repository.clone();
        let sink: Arc<dyn AuditSink> = audit.clone();
        Self {
            register: StandardRegisterSchemaUseCase::new(repo.clone(), sink.clone()),
            replace: StandardReplacePolicyMetadataUseCase::new(repo.clone(), sink.clone()),
            grant: StandardUpdateAllowListUseCase::new(repo.clone(), sink.clone()),
            decide: StandardDecideAccessUseCase::new(repo, sink),
            repository,
            audit,
        }
    }

    async fn register_sdl(&self) {
        self.register
            .register(
                &RequestContext::new("trace-register"),
                RegisterSchemaRequest {
                    schema_id: SCHEMA_ID.to_string(),
                    provider_id: PROVIDER.to_string(),
                    sdl: SDL.to_string(),
                    field_owners: HashMap::new(),
                },
            )
            .await
            .unwrap();
    }

    async fn grant_fields(&self, duration: &str, fields: &[&str]) -> Result<usize, PolicyError> {
        self.grant
            .grant(
                &RequestContext::new("trace-grant"),
                UpdateAllowListRequest {
                    application_id: APP.to_string(),
                    grant_duration: duration.to_string(),
                    records: fields.iter().map(|f| FieldRef::new(SCHEMA_ID, *f)).collect(),
                },
            )
            .await
            .map(|granted| granted.len())
    }

    async fn decide_fields(&self, fields: &[&str]) -> Result<pdp_core::domain::decision::PolicyDecision, PolicyError> {
        self.decide
            .decide(
                &RequestContext::new("trace-decide"),
                DecideAccessRequest {
                    application_id: APP.to_string(),
                    required_fields: fields.iter().map(|f| FieldRef::new(SCHEMA_ID, *f)).collect(),
                },
            )
            .await
    }
}

#[tokio::test]
async fn test_schema_registration_resolves_owners() {
    let pdp = Pdp::new();
    let registered = pdp
        .register
        .register(
            &RequestContext::new("t"),
            RegisterSchemaRequest {
                schema_id: SCHEMA_ID.to_string(),
                provider_id: PROVIDER.to_string(),
                sdl: SDL.to_string(),
                field_owners: HashMap::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(registered.records.len(), 3);
    assert_eq!(registered.unresolved_owner_fields, vec!["person.photo"]);

    let photo = pdp.repository.get(SCHEMA_ID, "person.photo").await.unwrap();
    assert!(!photo.is_owner);
    assert_eq!(photo.owner, Some(Owner::unknown()));

    let full_name = registered.fields.iter().find(|f| f.field_name == "person.fullName").unwrap();
    assert_eq!(full_name.owner_resolution, OwnerResolution::Provider);
    assert!(!full_name.consent_required);
}

#[tokio::test]
async fn test_public_owned_field_without_grant_is_unauthorized() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;

    let decision = pdp.decide_fields(&["person.fullName"]).await.unwrap();
    assert!(!decision.app_authorized);
    assert_eq!(decision.unauthorized_fields[0].field_name, "person.fullName");
}

#[tokio::test]
async fn test_grant_then_decide() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;

    assert_eq!(pdp.grant_fields("30d", &["person.fullName", "person.nic"]).await.unwrap(), 2);

    let decision = pdp.decide_fields(&["person.fullName", "person.nic"]).await.unwrap();
    assert!(decision.app_authorized);
    assert!(!decision.app_access_expired);
    assert!(decision.app_requires_owner_consent);
    assert_eq!(decision.consent_required_fields.len(), 1);
    assert_eq!(decision.consent_required_fields[0].field_name, "person.nic");
    assert_eq!(decision.consent_required_fields[0].owner, Some(Owner::citizen()));
}

#[tokio::test]
async fn test_regrant_overwrites_expiry() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;

    pdp.grant_fields("365d", &["person.nic"]).await.unwrap();
    let yearly = pdp.repository.get(SCHEMA_ID, "person.nic").await.unwrap();
    pdp.grant_fields("30d", &["person.nic"]).await.unwrap();
    let monthly = pdp.repository.get(SCHEMA_ID, "person.nic").await.unwrap();

    let yearly_expiry = yearly.allow_list.get(APP).unwrap().expires_at;
    let monthly_expiry = monthly.allow_list.get(APP).unwrap().expires_at;
    assert!(monthly_expiry < yearly_expiry);
    assert_eq!(monthly.allow_list.len(), 1);
}

#[tokio::test]
async fn test_expired_grant_is_expired_not_consent() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;

    let past = Utc::now() - Duration::days(2);
    pdp.repository
        .grant(
            APP,
            &[FieldRef::new(SCHEMA_ID, "person.nic")],
            AllowListEntry { expires_at: past + Duration::days(1), updated_at: past },
        )
        .await
        .unwrap();

    let decision = pdp.decide_fields(&["person.nic"]).await.unwrap();
    assert!(decision.app_authorized);
    assert!(decision.app_access_expired);
    assert_eq!(decision.expired_fields.len(), 1);
    assert!(!decision.app_requires_owner_consent);
}

#[tokio::test]
async fn test_unknown_pair_fails_whole_decision() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;

    let result = pdp.decide_fields(&["person.fullName", "person.shoeSize"]).await;
    assert!(matches!(result, Err(PolicyError::NotFound(msg)) if msg.contains("person.shoeSize")));

    let failures: Vec<_> = pdp
        .audit
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e, PolicyEvent::DecisionFailed { reason, .. } if reason == "not_found"))
        .cloned()
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn test_grant_rejects_bad_duration_and_missing_fields_atomically() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;

    let bad_duration = pdp.grant_fields("7d", &["person.nic"]).await;
    assert!(matches!(bad_duration, Err(PolicyError::InvalidArgument(_))));

    let missing = pdp.grant_fields("30d", &["person.nic", "person.missing"]).await;
    assert!(matches!(missing, Err(PolicyError::NotFound(_))));

    let nic = pdp.repository.get(SCHEMA_ID, "person.nic").await.unwrap();
    assert!(nic.allow_list.is_empty());
}

#[tokio::test]
async fn test_replacement_keeps_grants_and_deletes_omitted() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;
    pdp.grant_fields("30d", &["person.nic"]).await.unwrap();

    let stored = pdp.repository.get(SCHEMA_ID, "person.nic").await.unwrap();
    let record = pdp_core::domain::policy::FieldPolicyRecord {
        field_name: stored.field_name.clone(),
        display_name: Some("NIC".to_string()),
        description: stored.description.clone(),
        source: stored.source,
        is_owner: stored.is_owner,
        access_control_type: stored.access_control_type,
        owner: stored.owner.clone(),
    };
    let request = ReplacePolicyMetadataRequest {
        schema_id: SCHEMA_ID.to_string(),
        records: vec![record],
    };

    let first = pdp.replace.replace(&RequestContext::new("r1"), request.clone()).await.unwrap();
    let second = pdp.replace.replace(&RequestContext::new("r2"), request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(pdp.repository.len(), 1);
    assert!(first[0].allow_list.get(APP).is_some());
    assert!(matches!(
        pdp.repository.get(SCHEMA_ID, "person.fullName").await,
        Err(pdp_core::domain::repository::RepositoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_decide_requires_application_id() {
    let pdp = Pdp::new();
    let result = pdp
        .decide
        .decide(
            &RequestContext::new("t"),
            DecideAccessRequest { application_id: " ".to_string(), required_fields: vec![] },
        )
        .await;
    assert!(matches!(result, Err(PolicyError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_audit_events_carry_trace_id() {
    let pdp = Pdp::new();
    pdp.register_sdl().await;
    pdp.grant_fields("30d", &["person.fullName"]).await.unwrap();
    pdp.decide_fields(&["person.fullName", "person.fullName"]).await.unwrap();

    let events = pdp.audit.events.lock();
    let traces: Vec<&str> = events.iter().map(|e| e.trace_id()).collect();
    assert_eq!(traces, vec!["trace-register", "trace-grant", "trace-decide"]);

    match &events[2] {
        PolicyEvent::DecisionEvaluated { requested_fields, app_authorized, .. } => {
            assert_eq!(requested_fields.len(), 1);
            assert!(*app_authorized);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
