//! Knowledge-base corpus scanner.
//!
//! Walks the configured corpus root, detects each file's format from its
//! extension, and assigns a category from the immediate parent folder
//! name. Categories outside the allowed set are coerced to
//! `"uncategorized"` so free-text folder names never leak downstream.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::DocumentFormat;

/// Fallback category for folders outside the allowed set.
pub const UNCATEGORIZED: &str = "uncategorized";

/// One corpus file selected for ingestion. Text is extracted later, per
/// format, by the `extract` module.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub path: PathBuf,
    pub relative: String,
    pub file_name: String,
    pub category: String,
    pub format: DocumentFormat,
}

/// Scan the corpus root and return entries in deterministic order.
/// Unsupported extensions are logged and skipped, never fatal.
pub fn scan_corpus(config: &Config) -> Result<Vec<CorpusEntry>> {
    let root = &config.corpus.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.corpus.include_globs)?;
    let exclude_set = build_globset(&config.corpus.exclude_globs)?;

    let mut entries = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        // Hidden files and directories (.git, .DS_Store, editor droppings)
        // are never knowledge-base content.
        if relative
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            continue;
        }

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let format = match DocumentFormat::from_extension(&ext) {
            Some(f) => f,
            None => {
                tracing::warn!(path = %rel_str, "skipping unsupported document format");
                continue;
            }
        };

        entries.push(CorpusEntry {
            path: path.to_path_buf(),
            relative: rel_str,
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            category: category_for(path, root, &config.categories.allowed),
            format,
        });
    }

    // Sort for deterministic ordering
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(entries)
}

/// Category = immediate parent folder name, normalized against the
/// allowed set. Files directly under the root, or in unknown folders,
/// become `"uncategorized"`.
fn category_for(path: &Path, root: &Path, allowed: &[String]) -> String {
    let parent_name = path
        .parent()
        .filter(|p| *p != root)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_lowercase());

    match parent_name {
        Some(name) => normalize_category(&name, allowed),
        None => UNCATEGORIZED.to_string(),
    }
}

/// Coerce a raw category label into the allowed set (case-insensitive)
/// or `"uncategorized"`.
pub fn normalize_category(raw: &str, allowed: &[String]) -> String {
    let lowered = raw.to_lowercase();
    if allowed.iter().any(|a| a.to_lowercase() == lowered) {
        lowered
    } else {
        UNCATEGORIZED.to_string()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn allowed() -> Vec<String> {
        vec!["policies".to_string(), "faq".to_string(), "guide".to_string()]
    }

    #[test]
    fn normalize_accepts_allowed_and_coerces_rest() {
        assert_eq!(normalize_category("faq", &allowed()), "faq");
        assert_eq!(normalize_category("FAQ", &allowed()), "faq");
        assert_eq!(normalize_category("random-folder", &allowed()), UNCATEGORIZED);
        assert_eq!(normalize_category("", &allowed()), UNCATEGORIZED);
    }

    #[test]
    fn scan_assigns_categories_and_skips_unsupported() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("faq")).unwrap();
        fs::create_dir_all(root.join("internal")).unwrap();
        fs::write(root.join("faq/returns.txt"), "returns text").unwrap();
        fs::write(root.join("internal/notes.md"), "# notes").unwrap();
        fs::write(root.join("top.txt"), "top-level").unwrap();
        fs::write(root.join("faq/data.bin"), [0u8; 4]).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/config.txt"), "not content").unwrap();
        fs::write(root.join("faq/.draft.txt"), "hidden draft").unwrap();

        let config_toml = format!(
            r#"
[db]
path = "{}/db.sqlite"

[corpus]
root = "{}"
include_globs = ["**/*.txt", "**/*.md", "**/*.bin"]
"#,
            root.display(),
            root.display()
        );
        let config: Config = toml::from_str(&config_toml).unwrap();

        let entries = scan_corpus(&config).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.relative.as_str()).collect();
        // .bin is excluded by format detection even though the glob matched
        // it; dotfiles are excluded outright.
        assert_eq!(names, vec!["faq/returns.txt", "internal/notes.md", "top.txt"]);

        assert_eq!(entries[0].category, "faq");
        assert_eq!(entries[1].category, UNCATEGORIZED);
        assert_eq!(entries[2].category, UNCATEGORIZED);
        assert_eq!(entries[1].format, DocumentFormat::Markdown);
    }

    #[test]
    fn missing_root_is_an_error() {
        let config_toml = r#"
[db]
path = "/tmp/db.sqlite"

[corpus]
root = "/nonexistent/kb-root"
"#;
        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(scan_corpus(&config).is_err());
    }
}
