//! Canonical and flat tool names.
//!
//! A tool is identified by `serverId::toolName`. Function-calling dialects
//! only accept `[A-Za-z0-9_]{1,64}`, so every canonical name also has a flat
//! form. The mapping back is an explicit table filled at registration, so
//! two names that flatten identically are caught instead of shadowed.

use std::collections::HashMap;

use crate::error::NameCollisionError;

/// Separator between server id and tool name.
pub const SEPARATOR: &str = "::";

/// Longest flat name the oracle accepts.
pub const MAX_FLAT_LEN: usize = 64;

/// Build the canonical name of a tool.
pub fn canonical_name(server_id: &str, tool_name: &str) -> String {
    format!("{server_id}{SEPARATOR}{tool_name}")
}

/// Split a canonical name into server id and tool name.
pub fn split_canonical(canonical: &str) -> Option<(&str, &str)> {
    canonical.split_once(SEPARATOR)
}

/// Map a canonical name into the flat identifier space. Idempotent.
pub fn sanitize(canonical: &str) -> String {
    canonical
        .replace(SEPARATOR, "_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FLAT_LEN)
        .collect()
}

/// Bidirectional canonical/flat name table.
#[derive(Debug, Default)]
pub struct NameTranslator {
    by_flat: HashMap<String, String>,
    by_canonical: HashMap<String, String>,
}

impl NameTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canonical name and return its flat form.
    ///
    /// Registering the same canonical name again is a no-op. A different
    /// canonical name with the same flat form is rejected and the first
    /// registration is kept.
    pub fn register(&mut self, canonical: &str) -> Result<String, NameCollisionError> {
        let flat = sanitize(canonical);

        if let Some(existing) = self.by_flat.get(&flat) {
            if existing == canonical {
                return Ok(flat);
            }
            return Err(NameCollisionError {
                flat,
                existing: existing.clone(),
                rejected: canonical.to_string(),
            });
        }

        self.by_flat.insert(flat.clone(), canonical.to_string());
        self.by_canonical.insert(canonical.to_string(), flat.clone());
        Ok(flat)
    }

    /// Canonical name for a flat identifier.
    pub fn resolve(&self, flat: &str) -> Option<&str> {
        self.by_flat.get(flat).map(String::as_str)
    }

    /// Flat identifier of a registered canonical name.
    pub fn flat_name(&self, canonical: &str) -> Option<&str> {
        self.by_canonical.get(canonical).map(String::as_str)
    }

    /// Drop a canonical name, returning its flat form.
    pub fn unregister(&mut self, canonical: &str) -> Option<String> {
        let flat = self.by_canonical.remove(canonical)?;
        self.by_flat.remove(&flat);
        Some(flat)
    }

    pub fn len(&self) -> usize {
        self.by_flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_flat.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_flat.clear();
        self.by_canonical.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize("fs::read_file"), "fs_read_file");
        assert_eq!(sanitize("brave-search::brave_web_search"), "brave_search_brave_web_search");
        assert_eq!(sanitize("git::log.show"), "git_log_show");
        assert_eq!(sanitize("ünï::cödé"), "_n__c_d_");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = canonical_name("server", &"x".repeat(100));
        let flat = sanitize(&long);
        assert_eq!(flat.len(), MAX_FLAT_LEN);
        assert!(flat.starts_with("server_x"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "fs::read_file",
            "a-b::c-d",
            "weird::na:me",
            "x::y::z",
            "spaces here::and there",
            "émoji🙂::tool",
            "",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {sample:?}");
        }
        let long = canonical_name(&"s-".repeat(40), &"t".repeat(40));
        let once = sanitize(&long);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_resolve_round_trips_registered_names() {
        let mut names = NameTranslator::new();
        let canonicals = ["fs::read_file", "fs::write-file", "web-search::query", "db::run_sql"];
        for canonical in canonicals {
            names.register(canonical).unwrap();
        }
        for canonical in canonicals {
            assert_eq!(names.resolve(&sanitize(canonical)), Some(canonical));
        }
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_collision_keeps_first() {
        let mut names = NameTranslator::new();
        assert_eq!(names.register("a-b::c").unwrap(), "a_b_c");

        let err = names.register("a_b::c").unwrap_err();
        assert_eq!(
            err,
            NameCollisionError {
                flat: "a_b_c".to_string(),
                existing: "a-b::c".to_string(),
                rejected: "a_b::c".to_string(),
            }
        );
        assert_eq!(names.resolve("a_b_c"), Some("a-b::c"));
        assert_eq!(names.flat_name("a_b::c"), None);
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_reregister_same_name_is_noop() {
        let mut names = NameTranslator::new();
        let first = names.register("fs::read_file").unwrap();
        let second = names.register("fs::read_file").unwrap();
        assert_eq!(first, second);
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_unregister_frees_flat_name() {
        let mut names = NameTranslator::new();
        names.register("a-b::c").unwrap();
        assert_eq!(names.unregister("a-b::c"), Some("a_b_c".to_string()));
        assert!(names.is_empty());
        assert!(names.register("a_b::c").is_ok());
    }

    #[test]
    fn test_split_canonical() {
        assert_eq!(split_canonical("fs::read_file"), Some(("fs", "read_file")));
        assert_eq!(split_canonical("x::y::z"), Some(("x", "y::z")));
        assert_eq!(split_canonical("plain"), None);
    }
}
