// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Schema Directive Parser
//!
//! Extracts field-level access metadata from an annotated GraphQL-like schema
//! document.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external SDL text → [`FieldDirective`] records
//! - **Anti-Corruption:** Nothing past this module sees schema text
//!
//! # Recognised annotations
//!
//! ```graphql
//! type Person {
//!   fullName: String @accessControl(type: "public") @source(value: "primary") @isOwner(value: true)
//!   nic: String @accessControl(type: "restricted") @owner(value: "citizen")
//!   photo: String @description(value: "Passport photo (JPEG)") @displayName(value: "Photo")
//! }
//! ```
//!
//! Parsing never fails. Lines that do not look like fields are skipped, and
//! annotations whose payload cannot be read yield `None` / `false`.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::schema::FieldDirective;

/// Root operation types carry no data fields.
const ROOT_TYPES: &[&str] = &["Query", "Mutation", "Subscription"];

static TYPE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\btype\s+(\w+)(?:\s+implements\s+[^{@]*)?(?:\s*@\w+(?:\s*\([^)]*\))?)*\s*\{")
        .expect("valid type header regex")
});

static TYPE_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btype\s+(\w+)").expect("valid type keyword regex"));

static FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s*(?:\([^)]*\))?\s*:\s*([^@]+)").expect("valid field line regex"));

static ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(value|type)\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(true|false)\b)"#).expect("valid argument regex")
});

pub struct SchemaDirectiveParser;

impl SchemaDirectiveParser {
    /// Parse every non-root `type` block of `sdl`, in document order.
    pub fn parse(sdl: &str) -> Vec<FieldDirective> {
        let cleaned = clean_sdl(sdl);
        let mut fields = Vec::new();

        for (type_name, body) in type_blocks(&cleaned) {
            if ROOT_TYPES.contains(&type_name) {
                continue;
            }
            for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if let Some(field) = parse_field_line(line, type_name) {
                    fields.push(field);
                }
            }
        }

        fields
    }
}

/// Drops blank lines, `#` comments and description strings.
fn clean_sdl(sdl: &str) -> String {
    let mut cleaned = Vec::new();
    let mut in_block_string = false;

    for raw in sdl.lines() {
        let outside = strip_block_strings(raw, &mut in_block_string);
        let line = strip_leading_description(strip_trailing_comment(outside.trim()));
        if !line.is_empty() {
            cleaned.push(line.to_string());
        }
    }

    cleaned.join("\n")
}

/// Text of `line` that lies outside `"""` block strings. A block may open
/// and close anywhere on a line; `in_block` carries the state across lines.
fn strip_block_strings(line: &str, in_block: &mut bool) -> String {
    let mut kept = String::new();
    let mut rest = line;

    while let Some(idx) = rest.find("\"\"\"") {
        if *in_block && rest[..idx].ends_with('\\') {
            // escaped \""" inside a block string
            rest = &rest[idx + 3..];
            continue;
        }
        if !*in_block {
            kept.push_str(&rest[..idx]);
            kept.push(' ');
        }
        *in_block = !*in_block;
        rest = &rest[idx + 3..];
    }
    if !*in_block {
        kept.push_str(rest);
    }

    kept
}

/// Removes a `"..."` description in front of a field, keeping what follows.
fn strip_leading_description(line: &str) -> &str {
    let Some(body) = line.strip_prefix('"') else {
        return line;
    };
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return body[idx + 1..].trim_start(),
            _ => {}
        }
    }
    // unterminated
    ""
}

fn strip_trailing_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return line[..idx].trim_end(),
            _ => {}
        }
    }
    line
}

/// Index of the delimiter closing the one opened just before `start`.
/// Quoted strings are skipped, so braces inside descriptions do not count.
fn find_closing(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn type_blocks(sdl: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut header_starts = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = TYPE_HEADER.captures(&sdl[cursor..]) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let body_start = cursor + whole.end();
        match find_closing(sdl, body_start, '{', '}') {
            Some(body_end) => {
                header_starts.push(cursor + whole.start());
                blocks.push((&sdl[cursor + name.start()..cursor + name.end()], &sdl[body_start..body_end]));
                cursor = body_end + 1;
            }
            // unbalanced block: nothing after it can be trusted
            None => break,
        }
    }

    for keyword in TYPE_KEYWORD.captures_iter(sdl) {
        let (Some(whole), Some(name)) = (keyword.get(0), keyword.get(1)) else {
            continue;
        };
        if !header_starts.contains(&whole.start()) {
            tracing::warn!(type_name = name.as_str(), "Skipping type whose block could not be read");
        }
    }

    blocks
}

fn parse_field_line(line: &str, parent_type: &str) -> Option<FieldDirective> {
    let caps = FIELD_LINE.captures(line)?;
    let name = caps.get(1)?.as_str().to_string();
    let field_type = caps.get(2)?.as_str().trim().to_string();

    let is_owner = directive_argument(line, "isOwner").is_some_and(|v| v == "true");

    Some(FieldDirective {
        name,
        field_type,
        parent_type: parent_type.to_string(),
        access_control: directive_argument(line, "accessControl"),
        source: directive_argument(line, "source"),
        is_owner,
        owner: directive_argument(line, "owner"),
        description: directive_argument(line, "description"),
        display_name: directive_argument(line, "displayName"),
    })
}

/// Payload of the first `value:` / `type:` argument of `@<directive>(...)`.
fn directive_argument(line: &str, directive: &str) -> Option<String> {
    let marker = format!("@{}", directive);
    let mut search_from = 0;

    while let Some(found) = line[search_from..].find(&marker) {
        let after_name = search_from + found + marker.len();
        search_from = after_name;

        // reject prefixes such as @owner matching @ownerRef
        let rest = &line[after_name..];
        if rest.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            continue;
        }
        let args_open = after_name + (rest.len() - rest.trim_start().len());
        if !line[args_open..].starts_with('(') {
            return None;
        }
        let args_end = find_closing(line, args_open + 1, '(', ')')?;
        let args = &line[args_open + 1..args_end];

        let caps = ARGUMENT.captures(args)?;
        return caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().replace("\\\"", "\""));
    }

    None
}
