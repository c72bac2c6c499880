//! Go crawler (spec §4.2/§4.3 Go rows).

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::Resolution;
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["go"];

static SINGLE_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+"([^"]+)"\s*$"#).unwrap());
static IMPORT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)import\s*\(([^)]*)\)").unwrap());
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());
static PACKAGE_MAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*package\s+main\s*$").unwrap());
static FUNC_MAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*func\s+main\s*\(\s*\)").unwrap());
static MODULE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*module\s+(\S+)").unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: Vec<String> = files.iter().map(|p| rel_id(root, p)).collect();
    let module_path = read_module_path(root);

    // directory -> non-test .go files, for "link to every file in the package dir".
    let mut dir_files: HashMap<String, Vec<String>> = HashMap::new();
    for id in &rel_ids {
        if id.ends_with("_test.go") {
            continue;
        }
        let dir = id.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();
        dir_files.entry(dir).or_default().push(id.clone());
    }

    let mut graph = Graph::new();
    let mut entries: BTreeSet<String> = BTreeSet::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();

    for path in &files {
        let (facts, is_entry) = extract(root, path);
        if is_entry {
            entries.insert(facts.rel_id.clone());
        }
        let mut node = Node::file(facts.rel_id.clone(), Lang::Go);
        node.size_loc = Some(facts.loc);
        node.sha256 = facts.sha256.clone();
        graph.upsert_node(node);
        facts_by_id.insert(facts.rel_id.clone(), facts);
    }

    for (id, facts) in &facts_by_id {
        for imp in &facts.imports {
            match resolve(&imp.specifier, module_path.as_deref(), &dir_files) {
                Resolution::Internal(_) => {
                    if let Some(dir_targets) = internal_targets(&imp.specifier, module_path.as_deref(), &dir_files) {
                        for target in dir_targets {
                            if &target == id {
                                continue;
                            }
                            graph.add_edge(Edge {
                                source: id.clone(),
                                target,
                                kind: EdgeKind::Import,
                                certainty: Certainty::Static,
                            });
                        }
                    }
                }
                Resolution::External(ext_id) => {
                    graph.upsert_node(Node::external(ext_id.clone()));
                    graph.add_edge(Edge { source: id.clone(), target: ext_id, kind: EdgeKind::Import, certainty: Certainty::Static });
                }
            }
        }
    }

    if entries.is_empty() {
        if let Some(first) = rel_ids.iter().min() {
            entries.insert(first.clone());
        }
    }
    for e in &entries {
        graph.entrypoints.insert(e.clone());
    }
    graph::finalize(&mut graph, &graph.entrypoints.clone(), false);
    graph
}

fn extract(root: &Path, path: &PathBuf) -> (FileFacts, bool) {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    let sanitized = crate::sanitize::sanitize(&raw, crate::sanitize::SanitizeOptions::c_like());
    let id = rel_id(root, path);
    let is_entry = PACKAGE_MAIN.is_match(&sanitized) && FUNC_MAIN.is_match(&sanitized);

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        if let Some(c) = SINGLE_IMPORT.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Import, certainty: Certainty::Static, line: line_no + 1 });
        }
    }
    if let Some(block) = IMPORT_BLOCK.captures(&sanitized) {
        let start_line = sanitized[..block.get(0).unwrap().start()].matches('\n').count() + 1;
        for (i, line) in block[1].lines().enumerate() {
            for c in QUOTED.captures_iter(line) {
                imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Import, certainty: Certainty::Static, line: start_line + i });
            }
        }
    }

    (
        FileFacts {
            abs_path: path.clone(),
            rel_id: id,
            package_or_module: None,
            declared_names: Vec::new(),
            imports,
            entry_marker: is_entry,
            loc: fsutil::count_loc(&raw),
            sha256: fsutil::sha256_file(path),
            findings: Vec::new(),
            has_side_effects: false,
        },
        is_entry,
    )
}

fn read_module_path(root: &Path) -> Option<String> {
    let text = std::fs::read_to_string(root.join("go.mod")).ok()?;
    MODULE_LINE.captures(&text).map(|c| c[1].to_string())
}

fn internal_targets(specifier: &str, module_path: Option<&str>, dir_files: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let module_path = module_path?;
    let suffix = specifier.strip_prefix(module_path)?.trim_start_matches('/');
    dir_files.get(suffix).cloned()
}

fn resolve(specifier: &str, module_path: Option<&str>, dir_files: &HashMap<String, Vec<String>>) -> Resolution {
    if let Some(mp) = module_path {
        if let Some(suffix) = specifier.strip_prefix(mp) {
            let suffix = suffix.trim_start_matches('/');
            if dir_files.contains_key(suffix) {
                return Resolution::Internal(suffix.to_string());
            }
        }
    }
    let first_segment = specifier.split('/').next().unwrap_or(specifier);
    if first_segment.contains('.') {
        Resolution::External(format!("go:{specifier}"))
    } else {
        Resolution::External(format!("std:{specifier}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_module_path_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/m\n\ngo 1.21\n").unwrap();
        std::fs::write(
            dir.path().join("main.go"),
            "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/m/util\"\n)\n\nfunc main(){}\n",
        )
        .unwrap();
        let util_dir = dir.path().join("util");
        std::fs::create_dir(&util_dir).unwrap();
        std::fs::write(util_dir.join("util.go"), "package util\n").unwrap();

        let skip = fsutil::default_skip_dirs();
        let g = crawl(dir.path(), &skip);

        assert!(g.edges.iter().any(|e| e.source == "main.go" && e.target == "util/util.go"));
        assert!(g.edges.iter().any(|e| e.source == "main.go" && e.target == "std:fmt"));
        assert_eq!(g.nodes["std:fmt"].state, crate::model::NodeState::Used);
        assert_eq!(g.nodes["std:fmt"].node_type, crate::model::NodeType::External);
        assert!(g.entrypoints.contains("main.go"));
    }

    #[test]
    fn external_id_distinguishes_stdlib_from_third_party() {
        let dir_files = HashMap::new();
        assert_eq!(resolve("fmt", Some("example.com/m"), &dir_files), Resolution::External("std:fmt".into()));
        assert_eq!(resolve("github.com/x/y", Some("example.com/m"), &dir_files), Resolution::External("go:github.com/x/y".into()));
    }
}
