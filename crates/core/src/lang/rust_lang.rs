//! Rust crawler (spec §4.2/§4.3 Rust rows).

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::Resolution;
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["rs"];

static MOD_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+(\w+)\s*;").unwrap());
static USE_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([^;]+);").unwrap());
static EXTERN_CRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*extern\s+crate\s+(\w+)\s*;").unwrap());
static FN_MAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:pub\s+)?(?:async\s+)?fn\s+main\s*\(").unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();
    let dep_names = read_cargo_deps(root);
    let bin_paths = read_cargo_bin_paths(root);

    let module_map = build_module_map(&rel_ids, &bin_paths);
    let file_to_path: HashMap<String, Vec<String>> = module_map.iter().map(|(k, v)| (v.clone(), k.clone())).collect();

    let mut graph = Graph::new();
    let mut entries: BTreeSet<String> = BTreeSet::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();

    for path in &files {
        let (facts, is_entry) = extract(root, path);
        if is_entry {
            entries.insert(facts.rel_id.clone());
        }
        let mut node = Node::file(facts.rel_id.clone(), Lang::Rust);
        node.size_loc = Some(facts.loc);
        node.sha256 = facts.sha256.clone();
        graph.upsert_node(node);
        facts_by_id.insert(facts.rel_id.clone(), facts);
    }
    if rel_ids.contains("src/main.rs") {
        entries.insert("src/main.rs".to_string());
    }
    for p in bin_paths.values() {
        if rel_ids.contains(p) {
            entries.insert(p.clone());
        }
    }

    for (id, facts) in &facts_by_id {
        let own_path = file_to_path.get(id).cloned().unwrap_or_default();
        for imp in &facts.imports {
            let resolution = resolve(&imp.specifier, imp.kind, id, &own_path, &module_map, &dep_names, &rel_ids);
            match resolution {
                Resolution::Internal(target) => {
                    if &target == id {
                        continue;
                    }
                    graph.add_edge(Edge { source: id.clone(), target, kind: imp.kind, certainty: imp.certainty });
                }
                Resolution::External(ext_id) => {
                    graph.upsert_node(Node::external(ext_id.clone()));
                    graph.add_edge(Edge { source: id.clone(), target: ext_id, kind: imp.kind, certainty: imp.certainty });
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
    let is_entry = FN_MAIN.is_match(&sanitized);

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        let line_no = line_no + 1;
        if let Some(c) = MOD_DECL.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Mod, certainty: Certainty::Static, line: line_no });
        }
        if let Some(c) = EXTERN_CRATE.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Extern, certainty: Certainty::Static, line: line_no });
        }
        if let Some(c) = USE_DECL.captures(line) {
            for expanded in expand_braces(c[1].trim()) {
                imports.push(ImportRef { specifier: expanded, kind: EdgeKind::Use, certainty: Certainty::Static, line: line_no });
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

/// Expands `use foo::{a, b::c}` into `["foo::a", "foo::b::c"]`. Handles one
/// level of brace nesting, which covers the overwhelming majority of
/// real-world `use` groups.
fn expand_braces(path: &str) -> Vec<String> {
    if let Some(brace_start) = path.find('{') {
        if let Some(brace_end) = path.rfind('}') {
            let prefix = path[..brace_start].trim_end_matches("::");
            let inner = &path[brace_start + 1..brace_end];
            return inner
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| if s == "self" { prefix.to_string() } else { format!("{prefix}::{s}") })
                .collect();
        }
    }
    vec![path.trim().to_string()]
}

fn module_dir_for(file_id: &str) -> (String, bool) {
    let (dir, name) = file_id.rsplit_once('/').unwrap_or(("", file_id));
    let stem = name.trim_end_matches(".rs");
    if matches!(stem, "lib" | "main" | "mod") {
        (dir.to_string(), true)
    } else {
        let own_dir = if dir.is_empty() { stem.to_string() } else { format!("{dir}/{stem}") };
        (own_dir, false)
    }
}

/// BFS from crate roots (`src/lib.rs`, `src/main.rs`, `[[bin]]` paths)
/// following `mod` declarations, building `module path segments -> file id`.
fn build_module_map(rel_ids: &HashSet<String>, bin_paths: &HashMap<String, String>) -> HashMap<Vec<String>, String> {
    let mut map = HashMap::new();
    let mut queue: VecDeque<(Vec<String>, String)> = VecDeque::new();

    for root_candidate in ["src/lib.rs", "src/main.rs"] {
        if rel_ids.contains(root_candidate) {
            queue.push_back((Vec::new(), root_candidate.to_string()));
        }
    }
    for p in bin_paths.values() {
        if rel_ids.contains(p) {
            queue.push_back((Vec::new(), p.clone()));
        }
    }

    let mut visited = HashSet::new();
    while let Some((path, file_id)) = queue.pop_front() {
        if !visited.insert(file_id.clone()) {
            continue;
        }
        map.insert(path.clone(), file_id.clone());

        // Children are discovered from the directory-naming convention
        // against the already-walked file set rather than by re-reading the
        // file's own `mod` declarations a second time.
        let (own_dir, _is_root_style) = module_dir_for(&file_id);
        for candidate_name in discover_possible_children(&own_dir, rel_ids) {
            let child_path = format!("{own_dir}/{candidate_name}.rs");
            let child_mod_path = format!("{own_dir}/{candidate_name}/mod.rs");
            let child_id = if rel_ids.contains(&child_path) {
                Some(child_path)
            } else if rel_ids.contains(&child_mod_path) {
                Some(child_mod_path)
            } else {
                None
            };
            if let Some(child_id) = child_id {
                let mut child_segments = path.clone();
                child_segments.push(candidate_name);
                queue.push_back((child_segments, child_id));
            }
        }
    }
    map
}

fn discover_possible_children(dir: &str, rel_ids: &HashSet<String>) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
    for id in rel_ids {
        if let Some(rest) = id.strip_prefix(&prefix) {
            if let Some(name) = rest.strip_suffix(".rs") {
                if !name.contains('/') && name != "mod" && name != "lib" && name != "main" {
                    names.insert(name.to_string());
                }
            } else if let Some(name) = rest.strip_suffix("/mod.rs") {
                if !name.is_empty() {
                    names.insert(name.to_string());
                }
            }
        }
    }
    names
}

fn resolve(
    specifier: &str,
    kind: EdgeKind,
    file_id: &str,
    own_path: &[String],
    module_map: &HashMap<Vec<String>, String>,
    dep_names: &HashSet<String>,
    rel_ids: &HashSet<String>,
) -> Resolution {
    if kind == EdgeKind::Mod {
        let (own_dir, _) = module_dir_for(file_id);
        let flat = format!("{own_dir}/{specifier}.rs");
        let nested = format!("{own_dir}/{specifier}/mod.rs");
        if rel_ids.contains(&flat) {
            return Resolution::Internal(flat);
        }
        if rel_ids.contains(&nested) {
            return Resolution::Internal(nested);
        }
        return Resolution::External(format!("crate:{specifier}"));
    }
    if kind == EdgeKind::Extern {
        return Resolution::External(format!("crate:{specifier}"));
    }

    let segments: Vec<&str> = specifier.split("::").collect();
    let resolved_segments: Vec<String> = match segments.first().copied() {
        Some("crate") => segments[1..].iter().map(|s| s.to_string()).collect(),
        Some("self") => {
            let mut v = own_path.to_vec();
            v.extend(segments[1..].iter().map(|s| s.to_string()));
            v
        }
        Some("super") => {
            let mut v = own_path.to_vec();
            v.pop();
            v.extend(segments[1..].iter().map(|s| s.to_string()));
            v
        }
        Some(first) if dep_names.contains(first) => {
            return Resolution::External(format!("crate:{first}"));
        }
        _ => segments.iter().map(|s| s.to_string()).collect(),
    };

    // Try progressively shorter prefixes: trailing segments are usually item
    // names (types/fns), not modules.
    for take in (0..=resolved_segments.len()).rev() {
        if let Some(found) = module_map.get(&resolved_segments[..take]) {
            return Resolution::Internal(found.clone());
        }
    }

    let first = segments.first().copied().unwrap_or(specifier);
    Resolution::External(format!("crate:{first}"))
}

fn read_cargo_deps(root: &Path) -> HashSet<String> {
    let mut deps = HashSet::new();
    if let Ok(text) = std::fs::read_to_string(root.join("Cargo.toml")) {
        if let Ok(value) = text.parse::<toml::Value>() {
            for table_name in ["dependencies", "dev-dependencies", "build-dependencies"] {
                if let Some(table) = value.get(table_name).and_then(|t| t.as_table()) {
                    deps.extend(table.keys().cloned());
                }
            }
        }
    }
    deps
}

fn read_cargo_bin_paths(root: &Path) -> HashMap<String, String> {
    let mut bins = HashMap::new();
    if let Ok(text) = std::fs::read_to_string(root.join("Cargo.toml")) {
        if let Ok(value) = text.parse::<toml::Value>() {
            if let Some(arr) = value.get("bin").and_then(|b| b.as_array()) {
                for entry in arr {
                    if let (Some(name), Some(path)) = (entry.get("name").and_then(|n| n.as_str()), entry.get("path").and_then(|p| p.as_str())) {
                        bins.insert(name.to_string(), path.to_string());
                    }
                }
            }
        }
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_brace_group() {
        let mut v = expand_braces("foo::{a, b::c}");
        v.sort();
        assert_eq!(v, vec!["foo::a".to_string(), "foo::b::c".to_string()]);
    }

    #[test]
    fn mod_rs_style_file_uses_own_directory() {
        let (dir, is_root) = module_dir_for("src/net/mod.rs");
        assert_eq!(dir, "src/net");
        assert!(is_root);
    }

    #[test]
    fn leaf_file_uses_stem_directory_for_children() {
        let (dir, is_root) = module_dir_for("src/net.rs");
        assert_eq!(dir, "src/net");
        assert!(!is_root);
    }

    #[test]
    fn crate_relative_use_resolves_through_module_map() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("lib.rs"), "mod util;\nuse crate::util::helper;\n").unwrap();
        std::fs::write(src.join("util.rs"), "pub fn helper() {}\n").unwrap();

        let skip = fsutil::default_skip_dirs();
        let g = crawl(dir.path(), &skip);
        assert!(g.edges.iter().any(|e| e.source == "src/lib.rs" && e.target == "src/util.rs" && e.kind == EdgeKind::Mod));
        assert!(g.edges.iter().any(|e| e.source == "src/lib.rs" && e.target == "src/util.rs" && e.kind == EdgeKind::Use));
    }
}
