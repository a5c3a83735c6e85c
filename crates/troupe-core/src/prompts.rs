// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System-prompt assembly for worker agents.

/// Fixed addendum instructing agents to consult their retrieval tool
/// instead of fabricating domain-specific answers.  The wording is part of
/// the protocol — models condition on it.
pub const RETRIEVAL_DIRECTIVE: &str = "\
You are an advanced AI assistant with access to a `search_knowledge_base` tool.
IMPORTANT: you do not know the contents of the user's private knowledge base by default.
When the user asks about a specific identifier, document, or any domain-specific
knowledge, you MUST first call `search_knowledge_base` to gather information.
Never guess. Analyse the request, form a precise search query, call the tool,
and answer using the returned material.";

/// Build the effective system prompt for one worker turn:
/// agent prompt ∪ persona snippet ∪ retrieval directive.
pub fn effective_system_prompt(system_prompt: &str, persona: Option<&str>) -> String {
    let mut prompt = system_prompt.to_string();
    if let Some(snippet) = persona {
        if !snippet.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(snippet);
        }
    }
    prompt.push_str("\n\n");
    prompt.push_str(RETRIEVAL_DIRECTIVE);
    prompt
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
