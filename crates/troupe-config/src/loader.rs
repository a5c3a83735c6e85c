// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::{OutputMode, ProvidersFile};

/// Default data directory when the CLI does not override it:
/// `~/.local/share/troupe` (or `./troupe-data` when no home is resolvable).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("troupe"))
        .unwrap_or_else(|| PathBuf::from("troupe-data"))
}

/// Load the per-user provider configuration document.
///
/// A missing file is not an error — the server starts with zero providers
/// and every chat request fails with a clear message until one is added.
/// A present-but-unparseable file *is* an error: silently ignoring it
/// would make a typo look like a wiped configuration.
pub fn load_providers(path: &Path) -> anyhow::Result<ProvidersFile> {
    if !path.is_file() {
        warn!(path = %path.display(), "provider config not found; starting with no providers");
        return Ok(ProvidersFile::default());
    }
    debug!(path = %path.display(), "loading provider config");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: ProvidersFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(file)
}

/// Load the output-modes (persona) document.  Missing or malformed files
/// fall back to the built-in modes — style snippets are cosmetic and must
/// never block a chat turn.
pub fn load_output_modes(path: &Path) -> Vec<OutputMode> {
    if path.is_file() {
        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|t| serde_json::from_str::<Vec<OutputMode>>(&t).map_err(Into::into))
        {
            Ok(modes) => return modes,
            Err(e) => warn!(path = %path.display(), "ignoring output modes file: {e}"),
        }
    }
    builtin_output_modes()
}

/// Built-in fallback modes used when no `output_modes.json` exists.
fn builtin_output_modes() -> Vec<OutputMode> {
    vec![
        OutputMode {
            id: "normal".into(),
            name: "Normal".into(),
            prompt: String::new(),
        },
        OutputMode {
            id: "efficient".into(),
            name: "Efficient".into(),
            prompt: "## Output requirements (efficient mode)\n\
                     1. Answer efficiently; skip filler and flattery.\n\
                     2. Split your output into two sections:\n\
                        - [Answer]: the direct answer, no decoration\n\
                        - [Reasoning]: your rationale, kept tight and persuasive"
                .into(),
        },
        OutputMode {
            id: "concise".into(),
            name: "Concise".into(),
            prompt: "## Output requirements (concise mode)\n\
                     1. Answer the question directly and extremely briefly.\n\
                     2. No explanations, no filler, no pleasantries.\n\
                     3. Output only the core answer."
                .into(),
        },
    ]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
