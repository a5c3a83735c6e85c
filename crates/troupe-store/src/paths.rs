// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Root lock for the data directory.
//!
//! Workspace, group, and agent identifiers arrive from unauthenticated
//! HTTP input and end up in filesystem paths.  Every path under the data
//! root must be built through [`sandboxed_join`], which admits each
//! identifier only as a single plain path component — no separators, no
//! `..`, no absolute paths — so a crafted id can never escape the root.

use std::path::{Component, Path, PathBuf};

use anyhow::bail;

/// Join identifier segments onto `root`, validating each one first.
///
/// Each segment must be exactly one normal path component.  Anything
/// else (empty, `.`, `..`, embedded separators, absolute paths) is
/// rejected before the path is constructed.
pub fn sandboxed_join(root: &Path, segments: &[&str]) -> anyhow::Result<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in segments {
        path.push(checked_segment(segment)?);
    }
    Ok(path)
}

/// Validate one identifier for use as a path segment.
pub fn checked_segment(segment: &str) -> anyhow::Result<&Path> {
    let rel = Path::new(segment);
    let mut components = rel.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(rel),
        _ => bail!("invalid identifier for path use: {segment:?}"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_join_under_root() {
        let p = sandboxed_join(Path::new("/data"), &["ws1", "agent_7"]).unwrap();
        assert_eq!(p, Path::new("/data/ws1/agent_7"));
    }

    #[test]
    fn parent_dir_is_rejected() {
        assert!(sandboxed_join(Path::new("/data"), &[".."]).is_err());
        assert!(sandboxed_join(Path::new("/data"), &["ws1", "../../etc"]).is_err());
    }

    #[test]
    fn absolute_segment_is_rejected() {
        assert!(sandboxed_join(Path::new("/data"), &["/etc/passwd"]).is_err());
    }

    #[test]
    fn embedded_separator_is_rejected() {
        assert!(sandboxed_join(Path::new("/data"), &["a/b"]).is_err());
        assert!(checked_segment("group/../../x").is_err());
    }

    #[test]
    fn empty_and_current_dir_are_rejected() {
        assert!(checked_segment("").is_err());
        assert!(checked_segment(".").is_err());
    }

    #[test]
    fn dotted_but_normal_names_are_allowed() {
        // Ids with interior dots are plain components, not traversal.
        assert!(checked_segment("group_v1.2").is_ok());
        assert!(checked_segment("..hidden").is_ok());
    }
}
