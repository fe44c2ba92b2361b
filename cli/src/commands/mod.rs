// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the PDP CLI

pub mod config;
pub mod decide;
pub mod schema;
pub mod update;

pub use self::config::ConfigCommand;
pub use self::decide::DecideCommand;
pub use self::schema::SchemaCommand;
pub use self::update::UpdateCommand;

/// Default server URL for commands that talk to a running PDP.
pub fn server_url(host: Option<&str>, port: Option<u16>) -> String {
    let host = match host {
        None | Some("0.0.0.0") => "127.0.0.1",
        Some(host) => host,
    };
    format!("http://{}:{}", host, port.unwrap_or(8080))
}
