// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Defensive JSON extraction from language-model output.
//!
//! Supervisor replies are supposed to be bare JSON, but models wrap them
//! in code fences, prepend prose, and append trailing commentary.  The
//! strategies below are tried in order:
//!
//! 1. strip markdown code fences and parse the remainder;
//! 2. walk from the first `{` with a string-aware, escape-aware brace
//!    counter to the matching `}`;
//! 3. take the span between the first `{` and the last `}`;
//! 4. surface the original decode error.

use serde_json::Value;
use tracing::debug;

/// Extract the first JSON object from possibly noisy model output.
pub fn extract_json(content: &str) -> anyhow::Result<Value> {
    // 1. Fenced or bare JSON after stripping markdown markers.
    let clean = content.replace("```json", "").replace("```", "");
    let clean = clean.trim();
    if let Ok(v) = serde_json::from_str::<Value>(clean) {
        return Ok(v);
    }

    // 2. Brace counting from the first '{'.  Braces inside string literals
    // must not count, and escaped quotes must not terminate strings.
    if let Some(span) = balanced_object_span(content) {
        if let Ok(v) = serde_json::from_str::<Value>(span) {
            return Ok(v);
        }
        debug!("balanced span found but did not parse");
    }

    // 3. Crude fallback: first '{' to last '}'.
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&content[start..=end]) {
                return Ok(v);
            }
        }
    }

    // 4. Surface the original error on the cleaned text.
    match serde_json::from_str::<Value>(clean) {
        Ok(v) => Ok(v),
        Err(err) => Err(anyhow::Error::new(err).context("no JSON object found in model output")),
    }
}

/// Locate the span of the first balanced top-level object in `content`.
fn balanced_object_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let bytes = content.as_bytes();
    let mut balance = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' => balance += 1,
                b'}' => {
                    balance -= 1;
                    if balance == 0 {
                        return Some(&content[start..=i]);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
