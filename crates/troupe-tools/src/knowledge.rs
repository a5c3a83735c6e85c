// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-agent retrieval index.
//!
//! The orchestration core treats retrieval as opaque: a query string in, a
//! human-readable snippet block out.  [`KnowledgeIndex`] is that boundary;
//! [`KeywordIndex`] is the built-in file-backed implementation used when an
//! agent's knowledge directory holds plain documents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Number of context lines shown before and after each match.
const CONTEXT_LINES: usize = 2;
/// Maximum number of excerpts shown per document.
const MAX_EXCERPTS_PER_DOC: usize = 3;
/// Maximum number of documents shown in results.
const MAX_DOCS_IN_RESULTS: usize = 5;

/// Opaque retrieval boundary bound to one agent's index.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// Search the index and return a human-readable snippet block.
    async fn search(&self, query: &str) -> anyhow::Result<String>;
}

/// One document in a keyword index.
#[derive(Debug, Clone)]
pub struct KnowledgeDoc {
    pub source: String,
    pub body: String,
}

/// Keyword/substring retrieval over an agent's document set.
///
/// Results are sorted by match count descending so the most relevant
/// document appears first.
pub struct KeywordIndex {
    docs: Vec<KnowledgeDoc>,
}

impl KeywordIndex {
    pub fn new(docs: Vec<KnowledgeDoc>) -> Self {
        Self { docs }
    }

    /// Load every `.md` and `.txt` file directly under `dir`.
    ///
    /// Returns `None` when the directory does not exist or holds no
    /// readable documents — the caller then binds no retrieval tool.
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let entries = std::fs::read_dir(dir).ok()?;
        let mut docs = Vec::new();
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
            })
            .collect();
        paths.sort();
        for path in paths {
            if let Ok(body) = std::fs::read_to_string(&path) {
                let source = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                docs.push(KnowledgeDoc { source, body });
            }
        }
        if docs.is_empty() {
            None
        } else {
            Some(Self::new(docs))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl KnowledgeIndex for KeywordIndex {
    async fn search(&self, query: &str) -> anyhow::Result<String> {
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("empty query");
        }
        let query_lower = query.to_lowercase();

        let mut ranked: Vec<(usize, String)> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let match_count = doc
                    .body
                    .lines()
                    .filter(|l| l.to_lowercase().contains(&query_lower))
                    .count();
                if match_count == 0 {
                    return None;
                }
                let excerpts = extract_excerpts(&doc.body, &query_lower);
                if excerpts.is_empty() {
                    return None;
                }
                let mut block = format!("### [{}] ({} match(es))", doc.source, match_count);
                for excerpt in excerpts {
                    block.push_str("\n\n");
                    block.push_str(&excerpt);
                }
                Some((match_count, block))
            })
            .collect();

        if ranked.is_empty() {
            return Ok(format!(
                "No matches for \"{query}\" in {} knowledge document(s).",
                self.docs.len()
            ));
        }

        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.truncate(MAX_DOCS_IN_RESULTS);

        let mut out = format!("## Knowledge search: \"{query}\"\n");
        for (_, block) in ranked {
            out.push('\n');
            out.push_str(&block);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Extract matching excerpts with surrounding context lines.  Matches whose
/// context windows overlap are merged into the earlier excerpt.
fn extract_excerpts(body: &str, query_lower: &str) -> Vec<String> {
    let lines: Vec<&str> = body.lines().collect();
    let mut excerpts = Vec::new();
    let mut covered_up_to = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains(query_lower) {
            continue;
        }
        let start = i.saturating_sub(CONTEXT_LINES);
        let end = (i + CONTEXT_LINES + 1).min(lines.len());
        if start < covered_up_to && !excerpts.is_empty() {
            continue;
        }
        covered_up_to = end;

        let window: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(j, l)| {
                let marker = if start + j == i { ">" } else { " " };
                format!("{marker} {l}")
            })
            .collect();
        excerpts.push(window.join("\n"));

        if excerpts.len() >= MAX_EXCERPTS_PER_DOC {
            break;
        }
    }

    excerpts
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, body: &str) -> KnowledgeDoc {
        KnowledgeDoc { source: source.into(), body: body.into() }
    }

    #[tokio::test]
    async fn empty_query_is_an_error() {
        let idx = KeywordIndex::new(vec![doc("a.md", "text")]);
        assert!(idx.search("  ").await.is_err());
    }

    #[tokio::test]
    async fn no_match_reports_document_count() {
        let idx = KeywordIndex::new(vec![doc("a.md", "nothing here"), doc("b.md", "or here")]);
        let out = idx.search("quorum").await.unwrap();
        assert!(out.contains("No matches"));
        assert!(out.contains("2 knowledge document(s)"));
    }

    #[tokio::test]
    async fn match_includes_context_and_marker() {
        let idx = KeywordIndex::new(vec![doc(
            "pricing.md",
            "intro\nbefore\nThe enterprise tier costs 99 EUR.\nafter\noutro",
        )]);
        let out = idx.search("enterprise").await.unwrap();
        assert!(out.contains("pricing.md"));
        assert!(out.contains("> The enterprise tier"));
        assert!(out.contains("before"));
        assert!(out.contains("after"));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let idx = KeywordIndex::new(vec![doc("a.md", "The RELEASE_DATE is March 3.")]);
        let out = idx.search("release_date").await.unwrap();
        assert!(out.contains("RELEASE_DATE"));
    }

    #[tokio::test]
    async fn documents_ranked_by_match_count() {
        let idx = KeywordIndex::new(vec![
            doc("few.md", "one target mention"),
            doc("many.md", "target\ntarget\ntarget"),
        ]);
        let out = idx.search("target").await.unwrap();
        let many_pos = out.find("many.md").unwrap();
        let few_pos = out.find("few.md").unwrap();
        assert!(many_pos < few_pos);
    }

    #[test]
    fn overlapping_matches_merge_into_one_excerpt() {
        let excerpts = extract_excerpts("a\nhit one\nhit two\nb", "hit");
        assert_eq!(excerpts.len(), 1);
    }

    #[test]
    fn from_dir_missing_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(KeywordIndex::from_dir(&dir.path().join("absent")).is_none());
    }

    #[test]
    fn from_dir_loads_md_and_txt_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "alpha").unwrap();
        std::fs::write(dir.path().join("extra.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1]).unwrap();
        let idx = KeywordIndex::from_dir(dir.path()).unwrap();
        assert_eq!(idx.docs.len(), 2);
    }
}
