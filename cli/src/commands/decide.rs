// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `pdp decide`: ask a running PDP for an access decision.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use pdp_sdk::{DecideAccessRequest, DecisionField, FieldRef, PdpClient, PolicyDecision};

#[derive(Args)]
pub struct DecideCommand {
    /// Consumer application id
    #[arg(long = "app")]
    application_id: String,

    /// Required field as `schemaId:fieldName` (repeatable)
    #[arg(long = "field", value_name = "SCHEMA:FIELD", required = true, value_parser = parse_field_ref)]
    fields: Vec<FieldRef>,

    /// PDP base URL (default: derived from --host/--port)
    #[arg(long, env = "PDP_URL")]
    url: Option<String>,

    /// Print the raw decision JSON
    #[arg(long)]
    json: bool,
}

/// Field names never contain `:`, so the last colon separates the pair.
fn parse_field_ref(value: &str) -> Result<FieldRef, String> {
    match value.rsplit_once(':') {
        Some((schema_id, field_name)) if !schema_id.is_empty() && !field_name.is_empty() => {
            Ok(FieldRef::new(schema_id, field_name))
        }
        _ => Err(format!("expected SCHEMA:FIELD, got '{}'", value)),
    }
}

pub async fn execute(cmd: DecideCommand, default_url: String) -> Result<()> {
    let client = PdpClient::new(cmd.url.unwrap_or(default_url));
    let request = DecideAccessRequest {
        application_id: cmd.application_id,
        required_fields: cmd.fields,
    };

    let decision = client
        .decide(&request)
        .await
        .with_context(|| format!("Decision request to {} failed", client.base_url()))?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        print_decision(&request.application_id, &decision);
    }

    Ok(())
}

fn print_decision(application_id: &str, decision: &PolicyDecision) {
    println!("{}", format!("Decision for {}", application_id).bold());

    if decision.app_authorized {
        println!("  {}", "✓ authorized".green());
    } else {
        println!("  {}", "✗ not authorized".red());
        print_fields(&decision.unauthorized_fields);
    }
    if decision.app_access_expired {
        println!("  {}", "! access expired".red());
        print_fields(&decision.expired_fields);
    }
    if decision.app_requires_owner_consent {
        println!("  {}", "! owner consent required".yellow());
        print_fields(&decision.consent_required_fields);
    }
}

fn print_fields(fields: &[DecisionField]) {
    for field in fields {
        match &field.owner {
            Some(owner) => println!("    - {}:{} (owner: {})", field.schema_id, field.field_name, owner.as_str()),
            None => println!("    - {}:{}", field.schema_id, field.field_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_ref() {
        assert_eq!(
            parse_field_ref("drp-schema-v1:person.nic").unwrap(),
            FieldRef::new("drp-schema-v1", "person.nic")
        );
        assert_eq!(
            parse_field_ref("urn:drp:v1:person.nic").unwrap(),
            FieldRef::new("urn:drp:v1", "person.nic")
        );
        assert!(parse_field_ref("person.nic").is_err());
        assert!(parse_field_ref(":person.nic").is_err());
        assert!(parse_field_ref("drp-schema-v1:").is_err());
    }

    #[tokio::test]
    async fn test_execute_against_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/policy/decide")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"appAuthorized":false,"unauthorizedFields":[{"fieldName":"person.nic","schemaId":"drp-schema-v1"}],
                   "appAccessExpired":false,"expiredFields":[],"appRequiresOwnerConsent":false,"consentRequiredFields":[]}"#,
            )
            .create_async()
            .await;

        let cmd = DecideCommand {
            application_id: "passport-app".to_string(),
            fields: vec![FieldRef::new("drp-schema-v1", "person.nic")],
            url: Some(server.url()),
            json: false,
        };
        execute(cmd, "http://unused".to_string()).await.unwrap();
        mock.assert_async().await;
    }
}
