//! Crawler executable discovery (spec §6): for each language, search the
//! current directory, the directory containing this controller binary, then
//! `PATH`, in that order. The first hit wins.

use depgraph_core::model::Lang;
use std::path::PathBuf;

pub const LANGS: [Lang; 8] = [
    Lang::Javascript,
    Lang::Python,
    Lang::Go,
    Lang::Rust,
    Lang::Java,
    Lang::Kotlin,
    Lang::Csharp,
    Lang::Dart,
];

pub fn binary_name(lang: Lang) -> &'static str {
    match lang {
        Lang::Javascript => "depgraph-js",
        Lang::Python => "depgraph-py",
        Lang::Go => "depgraph-go",
        Lang::Rust => "depgraph-rs",
        Lang::Java => "depgraph-java",
        Lang::Kotlin => "depgraph-kt",
        Lang::Csharp => "depgraph-cs",
        Lang::Dart => "depgraph-dart",
        Lang::External => "depgraph-server",
    }
}

/// Locates the executable for `lang`, or `None` if it isn't installed.
pub fn discover(lang: Lang) -> Option<PathBuf> {
    let name = binary_name(lang);
    let exe_name = if cfg!(windows) { format!("{name}.exe") } else { name.to_string() };

    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(&exe_name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    if let Ok(controller) = std::env::current_exe() {
        if let Some(dir) = controller.parent() {
            let candidate = dir.join(&exe_name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(&exe_name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

/// Discovers every crawler executable, reporting hits and misses.
pub fn discover_all() -> Vec<(Lang, Option<PathBuf>)> {
    LANGS.iter().map(|&lang| (lang, discover(lang))).collect()
}
