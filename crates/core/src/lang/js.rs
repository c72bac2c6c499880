//! JavaScript / TypeScript crawler: extraction, resolution, entry discovery
//! (spec §4.2, §4.3 JS/TS rows).

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::{try_extensions_then_index, Resolution};
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

static IMPORT_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?\*\s+as\s+\w+\s+from\s+['"]([^'"]+)['"]"#).unwrap());
static IMPORT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?(?:[\w$*{},\s]+\s+from\s+)?['"]([^'"]+)['"]"#).unwrap());
static EXPORT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*export\s+(?:\*|\{[^}]*\}|\*\s+as\s+\w+)\s+from\s+['"]([^'"]+)['"]"#).unwrap());
static BARE_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
static REQUIRE_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"import\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();

    let mut graph = Graph::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();

    for path in &files {
        let facts = extract(root, path);
        let mut node = Node::file(facts.rel_id.clone(), Lang::Javascript);
        node.size_loc = Some(facts.loc);
        node.sha256 = facts.sha256.clone();
        graph.upsert_node(node);
        if !facts.findings.is_empty() {
            graph.findings.insert(facts.rel_id.clone(), facts.findings.clone());
        }
        facts_by_id.insert(facts.rel_id.clone(), facts);
    }

    for (id, facts) in &facts_by_id {
        for imp in &facts.imports {
            let resolution = resolve(root, id, &imp.specifier, &rel_ids);
            match resolution {
                Resolution::Internal(target) => {
                    graph.add_edge(Edge { source: id.clone(), target, kind: imp.kind, certainty: imp.certainty });
                }
                Resolution::External(ext_id) => {
                    graph.upsert_node(Node::external(ext_id.clone()));
                    graph.add_edge(Edge { source: id.clone(), target: ext_id, kind: imp.kind, certainty: imp.certainty });
                }
            }
        }
    }

    let entries = discover_entries(root, &rel_ids);
    for e in &entries {
        graph.entrypoints.insert(e.clone());
    }
    graph::finalize(&mut graph, &graph.entrypoints.clone(), true);
    graph
}

fn extract(root: &Path, path: &PathBuf) -> FileFacts {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    let sanitized = crate::sanitize::sanitize(&raw, crate::sanitize::SanitizeOptions::c_like());
    let id = rel_id(root, path);

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        let line_no = line_no + 1;
        // A single physical line can carry more than one statement
        // (`import './a'; import { b } from './c';`), so each `;`-delimited
        // segment is matched independently rather than stopping at the
        // line's first hit.
        for stmt in line.split(';') {
            if let Some(c) = IMPORT_STAR.captures(stmt) {
                imports.push(ImportRef {
                    specifier: c[1].to_string(),
                    kind: EdgeKind::ImportStar,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            } else if let Some(c) = BARE_IMPORT.captures(stmt) {
                // Checked before `IMPORT_FROM`: that regex's from-clause
                // group is optional and can match zero-width, so a bare
                // side-effect import would otherwise be captured as a
                // named `Import` edge instead of `SideEffect`.
                imports.push(ImportRef {
                    specifier: c[1].to_string(),
                    kind: EdgeKind::SideEffect,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            } else if let Some(c) = IMPORT_FROM.captures(stmt) {
                imports.push(ImportRef {
                    specifier: c[1].to_string(),
                    kind: EdgeKind::Import,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            } else if let Some(c) = EXPORT_FROM.captures(stmt) {
                imports.push(ImportRef {
                    specifier: c[1].to_string(),
                    kind: EdgeKind::Reexport,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            }

            for c in REQUIRE_CALL.captures_iter(stmt) {
                imports.push(ImportRef {
                    specifier: c[1].to_string(),
                    kind: EdgeKind::Require,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            }
            for c in DYNAMIC_IMPORT.captures_iter(stmt) {
                imports.push(ImportRef {
                    specifier: c[1].to_string(),
                    kind: EdgeKind::Dynamic,
                    certainty: Certainty::Heuristic,
                    line: line_no,
                });
            }
        }
    }

    let findings = crate::security::js::scan(&id, &raw, &sanitized);

    FileFacts {
        abs_path: path.clone(),
        rel_id: id,
        package_or_module: None,
        declared_names: Vec::new(),
        imports,
        entry_marker: false,
        loc: fsutil::count_loc(&raw),
        sha256: fsutil::sha256_file(path),
        findings,
        has_side_effects: false,
    }
}

/// Relative-specifier resolution, fixed order `∅, .ts, .tsx, .js, .jsx,
/// .mjs, .cjs` then `index.<ext>` variants; bare specifiers are external.
fn resolve(_root: &Path, importer_id: &str, specifier: &str, rel_ids: &HashSet<String>) -> Resolution {
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return Resolution::External(guess_package_name(specifier));
    }
    let base_dir = importer_id.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let candidate = crate::lang::join_rel(base_dir, specifier);
    let exists = |p: &str| rel_ids.contains(p);
    match try_extensions_then_index(&candidate, EXTENSIONS, exists) {
        Some(found) => Resolution::Internal(found),
        None => Resolution::External(specifier.to_string()),
    }
}

/// `@scope/name` or the first path segment, per spec §4.3's external id table.
fn guess_package_name(specifier: &str) -> String {
    if let Some(rest) = specifier.strip_prefix('@') {
        if let Some((scope, name)) = rest.split_once('/') {
            let pkg_name = name.split('/').next().unwrap_or(name);
            return format!("@{scope}/{pkg_name}");
        }
    }
    specifier.split('/').next().unwrap_or(specifier).to_string()
}

/// Entry discovery: `package.json` `main`/`module`/`exports` string values,
/// plus conventional fallbacks, unioned; lexicographically-first file as a
/// last resort so a repo never ends up all-`unused`.
fn discover_entries(root: &Path, rel_ids: &HashSet<String>) -> BTreeSet<String> {
    let mut entries = BTreeSet::new();

    if let Ok(text) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            for field in ["main", "module"] {
                if let Some(s) = value.get(field).and_then(|v| v.as_str()) {
                    push_if_exists(root, rel_ids, &mut entries, s);
                }
            }
            if let Some(exports) = value.get("exports") {
                collect_string_values(exports, &mut |s| push_if_exists(root, rel_ids, &mut entries, s));
            }
        }
    }

    for candidate in ["src/main.ts", "src/main.tsx", "src/main.js", "src/index.ts", "src/index.tsx", "src/index.js", "index.ts", "index.tsx", "index.js"] {
        push_if_exists(root, rel_ids, &mut entries, candidate);
    }

    if entries.is_empty() {
        if let Some(first) = rel_ids.iter().min() {
            entries.insert(first.clone());
        }
    }
    entries
}

fn push_if_exists(_root: &Path, rel_ids: &HashSet<String>, entries: &mut BTreeSet<String>, candidate: &str) {
    let normalized = candidate.trim_start_matches("./");
    if rel_ids.contains(normalized) {
        entries.insert(normalized.to_string());
    }
}

fn collect_string_values(value: &serde_json::Value, sink: &mut impl FnMut(&str)) {
    match value {
        serde_json::Value::String(s) => sink(s),
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_string_values(v, sink);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr {
                collect_string_values(v, sink);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolves_relative_extensionless_import() {
        let mut rel_ids = HashSet::new();
        rel_ids.insert("src/util.ts".to_string());
        let r = resolve(Path::new("."), "src/main.ts", "./util", &rel_ids);
        assert_eq!(r, Resolution::Internal("src/util.ts".to_string()));
    }

    #[test]
    fn bare_specifier_is_external_package() {
        let rel_ids = HashSet::new();
        let r = resolve(Path::new("."), "src/main.ts", "lodash/fp", &rel_ids);
        assert_eq!(r, Resolution::External("lodash".to_string()));
    }

    #[test]
    fn scoped_package_name_kept_to_scope_and_name() {
        assert_eq!(guess_package_name("@types/node/fs"), "@types/node");
    }

    #[test]
    fn s1_reachability_and_side_effect_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("main.ts"), "import './boot'; import { x } from './util';\n").unwrap();
        std::fs::write(src.join("boot.ts"), "").unwrap();
        std::fs::write(src.join("util.ts"), "export const x = 1;\n").unwrap();
        std::fs::write(src.join("dead.ts"), "export const y = 2;\n").unwrap();

        let skip = fsutil::default_skip_dirs();
        let g = crawl(dir.path(), &skip);

        assert_eq!(g.nodes.len(), 4);
        assert_eq!(g.nodes["src/main.ts"].state, crate::model::NodeState::Used);
        assert_eq!(g.nodes["src/util.ts"].state, crate::model::NodeState::Used);
        assert_eq!(g.nodes["src/boot.ts"].state, crate::model::NodeState::SideEffectOnly);
        assert_eq!(g.nodes["src/dead.ts"].state, crate::model::NodeState::Unused);
        assert_eq!(g.edges.len(), 2);
        assert!(g.edges.iter().all(|e| e.certainty == Certainty::Static));
    }
}
