//! Markdown input discovery and validation.
//!
//! This is intentionally kept separate from clap parsing:
//! - clap handles structured flags/subcommands
//! - the picker validates the chosen path and lists candidate `*.md` files
//!
//! The TUI uses the discovered list to cycle through inputs in the working
//! directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Default directory recursion depth for finding Markdown files.
const DEFAULT_SEARCH_DEPTH: usize = 4;

/// Validate the provided path points to an existing `.md` file.
pub fn validate_markdown_path(path: &Path) -> Result<PathBuf, AppError> {
    if !path.exists() {
        return Err(AppError::input(format!(
            "Markdown file not found: {}",
            path.display()
        )));
    }
    if path.is_dir() {
        return Err(AppError::input(format!(
            "Expected a file, got a directory: {}",
            path.display()
        )));
    }
    if !has_md_extension(path) {
        return Err(AppError::input(format!(
            "Only .md files are supported (got: {}).",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

fn has_md_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        == Some(true)
}

/// Discover `*.md` files under the current directory (deterministic order).
pub fn discover_markdown_files() -> Vec<PathBuf> {
    find_markdown_files(Path::new("."), DEFAULT_SEARCH_DEPTH)
}

fn find_markdown_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    find_markdown_files_inner(root, 0, max_depth, &mut out);
    out.sort_by(|a, b| pretty_path(a).cmp(&pretty_path(b)));
    out
}

fn find_markdown_files_inner(root: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }

    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            if should_skip_dir(&path) {
                continue;
            }
            find_markdown_files_inner(&path, depth + 1, max_depth, out);
            continue;
        }

        if file_type.is_file() && has_md_extension(&path) {
            out.push(path);
        }
    }
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    matches!(name, ".git" | "target" | "node_modules")
}

pub fn pretty_path(path: &Path) -> String {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    stripped.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_extension_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("input.txt");
        fs::write(&txt, "```json\n{}\n```").unwrap();

        let err = validate_markdown_path(&txt).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains(".md"));

        let missing = dir.path().join("missing.md");
        assert!(validate_markdown_path(&missing).is_err());
        assert!(validate_markdown_path(dir.path()).is_err());
    }

    #[test]
    fn accepts_upper_case_extension() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("INPUT.MD");
        fs::write(&md, "x").unwrap();
        assert_eq!(validate_markdown_path(&md).unwrap(), md);
    }

    #[test]
    fn discovery_is_sorted_and_skips_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("b/two.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("target/skip.md"), "").unwrap();

        let found = find_markdown_files(dir.path(), DEFAULT_SEARCH_DEPTH);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.md"), PathBuf::from("b/two.md")]);
    }
}
