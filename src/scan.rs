//! Collect input files for `tutor ingest`.
//!
//! Explicit file arguments are taken as-is. Directory arguments are walked
//! recursively and filtered through the `[ingest]` include/exclude globs
//! (matched against the path relative to that directory) plus the default
//! excludes `.git`, `target` and `node_modules`.
//!
//! A walked file is named by its `/`-separated path relative to the walked
//! directory, so `week1/intro.md` and `week2/intro.md` keep separate
//! entries in the file-hash record. An explicit file argument is named by
//! its base name.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use tutor_harness_core::models::SourceFile;

use crate::config::IngestConfig;

/// Read every input file. Results are sorted by path.
pub fn collect_files(paths: &[PathBuf], config: &IngestConfig) -> Result<Vec<SourceFile>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    // (path on disk, name used as the dedup key)
    let mut found: Vec<(PathBuf, String)> = Vec::new();
    for path in paths {
        if path.is_file() {
            found.push((path.clone(), base_name(path)));
        } else if path.is_dir() {
            found.extend(walk_dir(path, &include_set, &exclude_set)?);
        } else {
            bail!("Input path does not exist: {}", path.display());
        }
    }

    found.sort();
    found.dedup_by(|a, b| a.0 == b.0);

    found
        .iter()
        .map(|(path, name)| read_source_file(path, name))
        .collect()
}

fn walk_dir(
    root: &Path,
    include_set: &GlobSet,
    exclude_set: &GlobSet,
) -> Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }
    Ok(files)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_source_file(path: &Path, name: &str) -> Result<SourceFile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(SourceFile::new(name, bytes))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_walks_and_filters() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("week1")).unwrap();
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        std::fs::write(root.join("week1/cells.md"), "cells").unwrap();
        std::fs::write(root.join("notes.txt"), "notes").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join("node_modules/dep.md"), "dep").unwrap();

        let files = collect_files(&[root.to_path_buf()], &IngestConfig::default()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["notes.txt", "week1/cells.md"]);
    }

    #[test]
    fn test_same_base_name_in_different_folders_keeps_distinct_names() {
        let dir = tempfile::TempDir::new().unwrap();
        for week in ["week1", "week2"] {
            std::fs::create_dir_all(dir.path().join(week)).unwrap();
            std::fs::write(dir.path().join(week).join("intro.md"), week).unwrap();
        }

        let files = collect_files(&[dir.path().to_path_buf()], &IngestConfig::default()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["week1/intro.md", "week2/intro.md"]);
    }

    #[test]
    fn test_explicit_file_and_missing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("lecture.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let files = collect_files(&[file.clone()], &IngestConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "lecture.pdf");

        assert!(collect_files(&[dir.path().join("missing")], &IngestConfig::default()).is_err());
    }

    #[test]
    fn test_custom_excludes() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/a.md"), "a").unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();

        let config = IngestConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..IngestConfig::default()
        };
        let files = collect_files(&[dir.path().to_path_buf()], &config).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "b.md");
    }
}
