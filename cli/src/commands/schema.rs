// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Schema commands
//!
//! - `pdp schema convert` parses an annotated SDL file offline and prints the
//!   `POST /policy/metadata` body it yields.
//! - `pdp schema submit` registers the SDL with a running PDP.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;

use pdp_core::application::register_schema::convert_schema;
use pdp_sdk::{PdpClient, RegisterSchemaRequest, ReplacePolicyMetadataRequest};

#[derive(Subcommand)]
pub enum SchemaCommand {
    /// Convert an annotated SDL file to policy metadata records (offline)
    Convert {
        #[command(flatten)]
        source: SchemaSource,
    },

    /// Register an annotated SDL file with a running PDP
    Submit {
        #[command(flatten)]
        source: SchemaSource,

        /// PDP base URL (default: derived from --host/--port)
        #[arg(long, env = "PDP_URL")]
        url: Option<String>,
    },
}

#[derive(Args)]
pub struct SchemaSource {
    /// SDL file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    #[arg(long)]
    schema_id: String,

    /// Data provider submitting the schema
    #[arg(long = "provider")]
    provider_id: String,

    /// Owner overrides as a JSON object, e.g. '{"person.nic": "citizen"}'
    #[arg(long, value_name = "JSON")]
    owners: Option<String>,
}

impl SchemaSource {
    fn into_request(self) -> Result<RegisterSchemaRequest> {
        let sdl = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read SDL file {:?}", self.file))?;
        let field_owners = match self.owners.as_deref() {
            Some(json) => parse_owners(json)?,
            None => HashMap::new(),
        };

        Ok(RegisterSchemaRequest {
            schema_id: self.schema_id,
            provider_id: self.provider_id,
            sdl,
            field_owners,
        })
    }
}

fn parse_owners(json: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(json).context("--owners must be a JSON object of field path to owner")
}

pub async fn handle_command(command: SchemaCommand, default_url: String) -> Result<()> {
    match command {
        SchemaCommand::Convert { source } => convert(source.into_request()?),
        SchemaCommand::Submit { source, url } => submit(source.into_request()?, url.unwrap_or(default_url)).await,
    }
}

fn convert(request: RegisterSchemaRequest) -> Result<()> {
    let conversion = convert_schema(&request)?;

    for field in conversion.unresolved_owner_fields() {
        eprintln!(
            "{}",
            format!("warning: owner of {} could not be resolved; stored as 'unknown'", field).yellow()
        );
    }

    let body = ReplacePolicyMetadataRequest {
        schema_id: request.schema_id,
        records: conversion.records,
    };
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}

async fn submit(request: RegisterSchemaRequest, url: String) -> Result<()> {
    let client = PdpClient::new(url);
    let registered = client
        .submit_schema(&request)
        .await
        .with_context(|| format!("Failed to register schema with {}", client.base_url()))?;

    println!(
        "{}",
        format!("✓ Registered {} fields for schema {}", registered.records.len(), request.schema_id).green()
    );
    for field in &registered.fields {
        let consent = if field.consent_required { "consent required".yellow() } else { "no consent".normal() };
        println!("  {} ({:?}, {})", field.field_name, field.owner_resolution, consent);
    }
    if !registered.unresolved_owner_fields.is_empty() {
        println!(
            "{}",
            format!("Unresolved owners: {}", registered.unresolved_owner_fields.join(", ")).yellow()
        );
    }

    Ok(())
}
