// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Decision Audit Emitter
//!
//! Ships [`PolicyEvent`]s to the external audit service as
//! `POST <endpoint>/api/audit-logs`.
//!
//! Emission is fire-and-forget. [`AuditSink::emit`] never blocks and never
//! fails: events go into a bounded queue drained by one background task, a full
//! queue drops the event (counted in `pdp_audit_events_dropped_total`), and each
//! delivery is bounded by its own request timeout. Delivery failures and
//! non-201 responses are logged and discarded, never retried.
//!
//! Without a configured endpoint, [`TracingAuditSink`] writes the events to the
//! structured log only.

use chrono::SecondsFormat;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::config::AuditConfig;
use crate::domain::events::PolicyEvent;

/// Destination of audit events. Implementations must return immediately.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: PolicyEvent);
}

/// Writes audit events to the tracing log.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: PolicyEvent) {
        if event.is_success() {
            debug!(trace_id = %event.trace_id(), event = ?event, "audit event");
        } else {
            info!(trace_id = %event.trace_id(), event = ?event, "audit event (failure)");
        }
    }
}

/// Audit-service request body.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub timestamp: String,
    pub event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub status: String,
    pub actor_type: String,
    pub actor_service_name: String,
    pub target_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_metadata: Option<serde_json::Value>,
}

impl AuditLogRequest {
    pub fn from_event(event: &PolicyEvent, service_name: &str) -> Self {
        let (event_type, requested_data, response_metadata) = match event {
            PolicyEvent::DecisionEvaluated {
                application_id,
                requested_fields,
                app_authorized,
                app_access_expired,
                app_requires_owner_consent,
                unauthorized_fields,
                expired_fields,
                consent_required_fields,
                ..
            } => (
                "READ",
                json!({ "applicationId": application_id, "requiredFields": requested_fields }),
                json!({
                    "appAuthorized": app_authorized,
                    "appAccessExpired": app_access_expired,
                    "appRequiresOwnerConsent": app_requires_owner_consent,
                    "unauthorizedFieldCount": unauthorized_fields,
                    "expiredFieldCount": expired_fields,
                    "consentRequiredFieldCount": consent_required_fields,
                }),
            ),
            PolicyEvent::DecisionFailed { application_id, requested_fields, reason, message, .. } => (
                "READ",
                json!({ "applicationId": application_id, "requiredFields": requested_fields }),
                json!({ "error": reason, "message": message }),
            ),
            PolicyEvent::MetadataReplaced { schema_id, field_count, .. } => (
                "CREATE",
                json!({ "schemaId": schema_id }),
                json!({ "recordCount": field_count }),
            ),
            PolicyEvent::MetadataReplaceFailed { schema_id, reason, message, .. } => (
                "CREATE",
                json!({ "schemaId": schema_id }),
                json!({ "error": reason, "message": message }),
            ),
            PolicyEvent::AllowListGranted { application_id, grant_duration, fields, expires_at, .. } => (
                "UPDATE",
                json!({ "applicationId": application_id, "grantDuration": grant_duration, "records": fields }),
                json!({ "expiresAt": expires_at, "recordCount": fields.len() }),
            ),
            PolicyEvent::AllowListGrantFailed { application_id, fields, reason, message, .. } => (
                "UPDATE",
                json!({ "applicationId": application_id, "records": fields }),
                json!({ "error": reason, "message": message }),
            ),
            PolicyEvent::SchemaRegistered { schema_id, provider_id, field_count, unresolved_owner_fields, .. } => (
                "CREATE",
                json!({ "schemaId": schema_id, "providerId": provider_id }),
                json!({ "recordCount": field_count, "unresolvedOwnerFields": unresolved_owner_fields }),
            ),
        };

        let (event_name, target_type, target_service_name, target_resource) = if event.is_decision() {
            ("POLICY_CHECK", "SERVICE", Some(service_name.to_string()), None)
        } else {
            ("MANAGEMENT_EVENT", "RESOURCE", None, Some("POLICY_METADATA".to_string()))
        };

        let trace_id = Some(event.trace_id().to_string()).filter(|t| !t.is_empty());

        Self {
            trace_id,
            timestamp: event.occurred_at().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_name: event_name.to_string(),
            event_type: Some(event_type.to_string()),
            status: if event.is_success() { "SUCCESS" } else { "FAILURE" }.to_string(),
            actor_type: "SERVICE".to_string(),
            actor_service_name: service_name.to_string(),
            target_type: target_type.to_string(),
            target_service_name,
            target_resource,
            requested_data: Some(requested_data),
            response_metadata: Some(response_metadata),
        }
    }
}

/// Queue-backed sink delivering events to the audit service over HTTP.
pub struct HttpAuditEmitter {
    sender: mpsc::Sender<PolicyEvent>,
}

impl HttpAuditEmitter {
    /// Spawn the delivery task. Must be called inside a Tokio runtime.
    ///
    /// The task ends once every `HttpAuditEmitter` handle is dropped and the
    /// queue is drained.
    pub fn start(endpoint: &str, config: &AuditConfig) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let url = format!("{}/api/audit-logs", endpoint.trim_end_matches('/'));
        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        info!(url = %url, queue_capacity = config.queue_capacity, "Starting audit emitter");
        let handle = tokio::spawn(deliver(client, url, config.service_name.clone(), receiver));

        Ok((Self { sender }, handle))
    }
}

impl AuditSink for HttpAuditEmitter {
    fn emit(&self, event: PolicyEvent) {
        if let Err(err) = self.sender.try_send(event) {
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "queue_full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            metrics::counter!("pdp_audit_events_dropped_total", "reason" => reason).increment(1);
            warn!(reason, "Dropping audit event");
        }
    }
}

async fn deliver(
    client: reqwest::Client,
    url: String,
    service_name: String,
    mut receiver: mpsc::Receiver<PolicyEvent>,
) {
    let mut delivered = 0u64;
    let mut failed = 0u64;

    while let Some(event) = receiver.recv().await {
        let request = AuditLogRequest::from_event(&event, &service_name);
        match client.post(&url).json(&request).send().await {
            Ok(response) if response.status() == StatusCode::CREATED => {
                delivered += 1;
                debug!(trace_id = ?request.trace_id, "Audit event delivered");
            }
            Ok(response) => {
                failed += 1;
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "Audit service returned non-201 status");
            }
            Err(e) => {
                failed += 1;
                warn!(error = %e, "Failed to send audit event");
            }
        }
    }

    info!(delivered, failed, "Audit emitter stopped");
}

/// Picks the sink for the configured audit settings.
pub fn audit_sink_from_config(config: Option<&AuditConfig>) -> anyhow::Result<(Arc<dyn AuditSink>, Option<JoinHandle<()>>)> {
    match config.and_then(|c| c.endpoint.as_deref().map(|e| (c, e))) {
        Some((config, endpoint)) => {
            let (emitter, handle) = HttpAuditEmitter::start(endpoint, config)?;
            Ok((Arc::new(emitter), Some(handle)))
        }
        None => {
            info!("Audit service URL not configured; audit events go to the log only");
            Ok((Arc::new(TracingAuditSink), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{FieldRef, GrantDuration};
    use chrono::Utc;
    use mockito::Matcher;

    fn decision_event(trace_id: &str) -> PolicyEvent {
        PolicyEvent::DecisionEvaluated {
            trace_id: trace_id.to_string(),
            application_id: "passport-app".to_string(),
            requested_fields: vec![FieldRef::new("drp-schema-v1", "person.nic")],
            app_authorized: true,
            app_access_expired: false,
            app_requires_owner_consent: true,
            unauthorized_fields: 0,
            expired_fields: 0,
            consent_required_fields: 1,
            evaluated_at: Utc::now(),
        }
    }

    async fn wait_for(mock: &mockito::Mock) -> bool {
        for _ in 0..50 {
            if mock.matched_async().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[test]
    fn test_decision_event_wire_shape() {
        let request = AuditLogRequest::from_event(&decision_event("trace-1"), "policy-decision-point");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["traceId"], "trace-1");
        assert_eq!(json["eventName"], "POLICY_CHECK");
        assert_eq!(json["eventType"], "READ");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["actorType"], "SERVICE");
        assert_eq!(json["actorServiceName"], "policy-decision-point");
        assert_eq!(json["targetType"], "SERVICE");
        assert_eq!(json["responseMetadata"]["appRequiresOwnerConsent"], true);
        assert_eq!(json["requestedData"]["requiredFields"][0]["fieldName"], "person.nic");
    }

    #[test]
    fn test_failed_grant_is_management_failure() {
        let event = PolicyEvent::AllowListGrantFailed {
            trace_id: String::new(),
            application_id: "passport-app".to_string(),
            fields: vec![],
            reason: "not_found".to_string(),
            message: "missing".to_string(),
            failed_at: Utc::now(),
        };
        let request = AuditLogRequest::from_event(&event, "pdp");
        assert_eq!(request.event_name, "MANAGEMENT_EVENT");
        assert_eq!(request.status, "FAILURE");
        assert_eq!(request.target_resource.as_deref(), Some("POLICY_METADATA"));
        assert!(request.trace_id.is_none());
    }

    #[test]
    fn test_grant_event_carries_duration() {
        let event = PolicyEvent::AllowListGranted {
            trace_id: "t".to_string(),
            application_id: "app".to_string(),
            grant_duration: GrantDuration::OneMonth,
            fields: vec![FieldRef::new("s", "person.nic")],
            expires_at: Utc::now(),
            granted_at: Utc::now(),
        };
        let request = AuditLogRequest::from_event(&event, "pdp");
        assert_eq!(request.requested_data.unwrap()["grantDuration"], "30d");
    }

    #[tokio::test]
    async fn test_http_emitter_posts_to_audit_service() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/audit-logs")
            .match_body(Matcher::PartialJson(json!({
                "traceId": "trace-42",
                "eventName": "POLICY_CHECK",
                "status": "SUCCESS"
            })))
            .with_status(201)
            .create_async()
            .await;

        let config = AuditConfig::default();
        let (emitter, _handle) = HttpAuditEmitter::start(&server.url(), &config).unwrap();
        emitter.emit(decision_event("trace-42"));

        assert!(wait_for(&mock).await);
    }

    #[tokio::test]
    async fn test_http_emitter_survives_rejections() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", "/api/audit-logs")
            .match_body(Matcher::PartialJson(json!({ "traceId": "first" })))
            .with_status(500)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/api/audit-logs")
            .match_body(Matcher::PartialJson(json!({ "traceId": "second" })))
            .with_status(201)
            .create_async()
            .await;

        let (emitter, _handle) = HttpAuditEmitter::start(&server.url(), &AuditConfig::default()).unwrap();
        emitter.emit(decision_event("first"));
        emitter.emit(decision_event("second"));

        assert!(wait_for(&rejected).await);
        assert!(wait_for(&accepted).await);
    }

    #[tokio::test]
    async fn test_emitter_stops_when_dropped() {
        let server = mockito::Server::new_async().await;
        let (emitter, handle) = HttpAuditEmitter::start(&server.url(), &AuditConfig::default()).unwrap();
        drop(emitter);
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_audit_uses_log_sink() {
        let (sink, handle) = audit_sink_from_config(None).unwrap();
        assert!(handle.is_none());
        sink.emit(decision_event("t"));

        let no_endpoint = AuditConfig::default();
        let (_, handle) = audit_sink_from_config(Some(&no_endpoint)).unwrap();
        assert!(handle.is_none());
    }
}
