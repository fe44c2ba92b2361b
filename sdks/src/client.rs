// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use pdp_core::presentation::api::TRACE_ID_HEADER;
use pdp_core::presentation::dto::{
    AllowListUpdateResponse, DecideAccessRequest, ErrorResponse, FieldPolicy, GrantedField, HealthResponse,
    PolicyDecision, PolicyMetadataResponse, RegisterSchemaRequest, RegisteredSchema, ReplacePolicyMetadataRequest,
    UpdateAllowListRequest,
};

#[derive(Debug, Error)]
pub enum PdpClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status with the server's `{code, message}` body.
    #[error("PDP returned {status} ({code}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl PdpClientError {
    /// Server-side error code (`invalid_argument`, `not_found`, ...), if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            PdpClientError::Api { code, .. } => Some(code),
            PdpClientError::Http(_) => None,
        }
    }
}

/// Client for the Policy Decision Point.
pub struct PdpClient {
    base_url: String,
    client: Client,
    trace_id: Option<String>,
}

impl PdpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            trace_id: None,
        }
    }

    /// Propagate a caller trace id on every request.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register an annotated SDL schema; the server derives and stores the field policies.
    pub async fn submit_schema(&self, request: &RegisterSchemaRequest) -> Result<RegisteredSchema, PdpClientError> {
        self.post_json("/api/v1/policy/schema", request).await
    }

    /// Replace the full field-policy set of one schema.
    pub async fn create_policy_metadata(
        &self,
        request: &ReplacePolicyMetadataRequest,
    ) -> Result<Vec<FieldPolicy>, PdpClientError> {
        let response: PolicyMetadataResponse = self.post_json("/api/v1/policy/metadata", request).await?;
        Ok(response.records)
    }

    /// Grant or renew an application's access to a set of fields.
    pub async fn update_allow_list(
        &self,
        request: &UpdateAllowListRequest,
    ) -> Result<Vec<GrantedField>, PdpClientError> {
        let response: AllowListUpdateResponse = self.post_json("/api/v1/policy/update-allowlist", request).await?;
        Ok(response.records)
    }

    pub async fn decide(&self, request: &DecideAccessRequest) -> Result<PolicyDecision, PdpClientError> {
        self.post_json("/api/v1/policy/decide", request).await
    }

    pub async fn health(&self) -> Result<HealthResponse, PdpClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.traced(self.client.get(&url)).send().await?;
        Self::parse(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, PdpClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.traced(self.client.post(&url).json(body)).send().await?;
        Self::parse(response).await
    }

    fn traced(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.trace_id {
            Some(trace_id) => req.header(TRACE_ID_HEADER, trace_id),
            None => req,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, PdpClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await?;
        let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => (body.code, body.message),
            Err(_) => ("unknown".to_string(), text),
        };
        Err(PdpClientError::Api { status, code, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pdp_core::domain::policy::FieldRef;
    use serde_json::json;

    fn decide_request() -> DecideAccessRequest {
        DecideAccessRequest {
            application_id: "passport-app".to_string(),
            required_fields: vec![FieldRef::new("drp-schema-v1", "person.nic")],
        }
    }

    #[tokio::test]
    async fn test_decide_parses_decision() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/policy/decide")
            .match_header(TRACE_ID_HEADER, "trace-1")
            .match_body(Matcher::PartialJson(json!({
                "applicationId": "passport-app",
                "requiredFields": [{ "schemaId": "drp-schema-v1", "fieldName": "person.nic" }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "appAuthorized": true,
                    "unauthorizedFields": [],
                    "appAccessExpired": false,
                    "expiredFields": [],
                    "appRequiresOwnerConsent": true,
                    "consentRequiredFields": [
                        { "fieldName": "person.nic", "schemaId": "drp-schema-v1", "owner": "citizen" }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = PdpClient::new(server.url()).with_trace_id("trace-1");
        let decision = client.decide(&decide_request()).await.unwrap();

        mock.assert_async().await;
        assert!(decision.app_authorized);
        assert!(decision.app_requires_owner_consent);
        assert_eq!(decision.consent_required_fields[0].field_name, "person.nic");
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/policy/decide")
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":"not_found","message":"policy metadata not found"}"#)
            .create_async()
            .await;

        let err = PdpClient::new(server.url()).decide(&decide_request()).await.unwrap_err();
        assert_eq!(err.code(), Some("not_found"));
        match err {
            PdpClientError::Api { status, message, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_allow_list_unwraps_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/policy/update-allowlist")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "records": [{
                        "fieldName": "person.nic",
                        "schemaId": "drp-schema-v1",
                        "expiresAt": "2026-11-19T00:00:00Z",
                        "updatedAt": "2026-10-19T00:00:00Z"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let granted = PdpClient::new(format!("{}/", server.url()))
            .update_allow_list(&UpdateAllowListRequest {
                application_id: "passport-app".to_string(),
                grant_duration: "30d".to_string(),
                records: vec![FieldRef::new("drp-schema-v1", "person.nic")],
            })
            .await
            .unwrap();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].field_name, "person.nic");
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/health").with_status(502).with_body("bad gateway").create_async().await;

        let err = PdpClient::new(server.url()).health().await.unwrap_err();
        assert_eq!(err.code(), Some("unknown"));
    }
}
