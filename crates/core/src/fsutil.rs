//! Path & filesystem utilities: forward-slash path normalization, the
//! ignore-set directory walk, non-empty LOC counting, and SHA-256 over raw
//! file bytes (spec §2 "Path & FS utilities", §5 "Resource policy").

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The closed per-language ignore set from spec §5. Config may add more
/// names on top of this; it never removes from it.
pub fn default_skip_dirs() -> HashSet<String> {
    [
        "node_modules",
        "dist",
        "build",
        "target",
        "out",
        ".git",
        ".idea",
        ".vscode",
        ".cache",
        ".turbo",
        ".vite",
        ".parcel-cache",
        ".next",
        "coverage",
        "vendor",
        "__pycache__",
        ".mypy_cache",
        ".pytest_cache",
        ".tox",
        ".dart_tool",
        "android",
        "ios",
        "macos",
        "linux",
        "windows",
        "bin",
        "obj",
        ".vs",
        ".gradle",
        ".mvn",
        ".settings",
        "packages",
        "TestResults",
        ".venv",
        "venv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Repository-relative, forward-slash path for a file under `root`.
pub fn rel_id(root: &Path, abs: &Path) -> String {
    abs.strip_prefix(root).unwrap_or(abs).to_string_lossy().replace('\\', "/")
}

/// Walk `root`, skipping `skip_dirs` and any hidden directory, collecting
/// every regular file whose extension is in `extensions` (case-sensitive,
/// without the leading dot). Symlinks are never followed. Parallelized via
/// `ignore`'s built-in worker pool; results are collected behind a `Mutex`
/// and the caller sees a stable sort applied afterward.
pub fn walk_source_files(
    root: &Path,
    skip_dirs: &HashSet<String>,
    extensions: &HashSet<&'static str>,
) -> Vec<PathBuf> {
    let results: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .filter_entry({
            let skip = skip_dirs.clone();
            move |entry| {
                if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    let name = entry.file_name().to_string_lossy();
                    return !skip.contains(name.as_ref());
                }
                true
            }
        })
        .build_parallel()
        .run(|| {
            Box::new(|entry| {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => return ignore::WalkState::Continue,
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    return ignore::WalkState::Continue;
                }
                let path = entry.path();
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if extensions.contains(ext) {
                    results.lock().unwrap().push(path.to_path_buf());
                }
                ignore::WalkState::Continue
            })
        });

    let mut files = results.into_inner().unwrap();
    files.sort();
    files
}

/// Count lines whose trimmed content is non-empty, computed on raw text
/// (spec §4.2 "Shared rules").
pub fn count_loc(raw: &str) -> usize {
    raw.lines().filter(|l| !l.trim().is_empty()).count()
}

/// SHA-256 over the raw bytes of a file, hex-encoded.
pub fn sha256_file(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loc_ignores_blank_and_whitespace_lines() {
        let text = "a\n\n  \nb\n\t\nc";
        assert_eq!(count_loc(text), 3);
    }

    #[test]
    fn rel_id_uses_forward_slashes() {
        let root = Path::new("/repo");
        let abs = Path::new("/repo/src/main.rs");
        assert_eq!(rel_id(root, abs), "src/main.rs");
    }

    #[test]
    fn sha256_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        )
    }
}
