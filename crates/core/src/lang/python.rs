//! Python crawler (spec §4.2/§4.3 Python rows).

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::{join_rel, Resolution};
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["py"];

static IMPORT_STMT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*import\s+(.+)$").unwrap());
static FROM_STMT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+(\.*)([\w\.]*)\s+import\s+(.+)$").unwrap());
static MAIN_GUARD: Lazy<Regex> = Lazy::new(|| Regex::new(r#"if\s+__name__\s*==\s*['"]__main__['"]"#).unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();
    let roots = package_roots(&rel_ids);

    let mut graph = Graph::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();
    let mut main_guard_files: BTreeSet<String> = BTreeSet::new();

    for path in &files {
        let (facts, has_main_guard) = extract(root, path);
        if has_main_guard {
            main_guard_files.insert(facts.rel_id.clone());
        }
        let mut node = Node::file(facts.rel_id.clone(), Lang::Python);
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
            let resolution = resolve(id, &imp.specifier, imp.kind, &rel_ids, &roots);
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

    let mut entries: BTreeSet<String> = main_guard_files;
    entries.extend(script_entries(root, &rel_ids));
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
    let sanitized = crate::sanitize::sanitize(&raw, crate::sanitize::SanitizeOptions::python());
    let id = rel_id(root, path);
    let has_main_guard = MAIN_GUARD.is_match(&sanitized);

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        let line_no = line_no + 1;
        if let Some(c) = FROM_STMT.captures(line) {
            let dots = c[1].len();
            let module = c[2].to_string();
            let names = c[3].trim_end_matches(|ch| ch == '\\' || ch == ':').trim();
            let kind = if dots > 0 { EdgeKind::FromRelative } else { EdgeKind::From };
            for name in split_names(names) {
                imports.push(ImportRef {
                    specifier: encode_from(dots, &module, &name),
                    kind,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            }
            continue;
        }
        if let Some(c) = IMPORT_STMT.captures(line) {
            for item in c[1].split(',') {
                let name = item.split_whitespace().next().unwrap_or("").trim_end_matches(',');
                if name.is_empty() || name == "as" {
                    continue;
                }
                imports.push(ImportRef {
                    specifier: name.to_string(),
                    kind: EdgeKind::Import,
                    certainty: Certainty::Static,
                    line: line_no,
                });
            }
        }
    }

    let findings = crate::security::python::scan(&id, &raw, &sanitized);

    (
        FileFacts {
            abs_path: path.clone(),
            rel_id: id,
            package_or_module: None,
            declared_names: Vec::new(),
            imports,
            entry_marker: has_main_guard,
            loc: fsutil::count_loc(&raw),
            sha256: fsutil::sha256_file(path),
            findings,
            has_side_effects: false,
        },
        has_main_guard,
    )
}

fn split_names(names: &str) -> Vec<String> {
    let trimmed = names.trim().trim_start_matches('(').trim_end_matches(')');
    if trimmed == "*" {
        return vec!["*".to_string()];
    }
    trimmed
        .split(',')
        .map(|n| n.split_whitespace().next().unwrap_or("").to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

/// Encodes a resolved specifier's pieces into one string the resolver can
/// parse back; keeps `resolve`'s signature uniform for both `import` and
/// `from` statements.
fn encode_from(dots: usize, module: &str, name: &str) -> String {
    format!("{}|{}|{}", dots, module, name)
}

fn resolve(importer_id: &str, specifier: &str, kind: EdgeKind, rel_ids: &HashSet<String>, roots: &BTreeSet<String>) -> Resolution {
    if kind == EdgeKind::From || kind == EdgeKind::FromRelative {
        let mut parts = specifier.splitn(3, '|');
        let dots: usize = parts.next().unwrap_or("0").parse().unwrap_or(0);
        let module = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");
        return resolve_from(importer_id, dots, module, name, rel_ids, roots);
    }
    resolve_absolute(specifier, rel_ids, roots)
}

fn resolve_absolute(dotted: &str, rel_ids: &HashSet<String>, roots: &BTreeSet<String>) -> Resolution {
    let parts: Vec<&str> = dotted.split('.').collect();
    for root in roots {
        let root_name = root.rsplit('/').next().unwrap_or(root);
        if parts.first() == Some(&root_name) {
            let rel = parts[1..].join("/");
            let base = if rel.is_empty() { root.clone() } else { format!("{root}/{rel}") };
            if let Some(found) = try_py_file(&base, rel_ids) {
                return Resolution::Internal(found);
            }
        }
    }
    // Repo-root fallback: treat the dotted path as directly rooted.
    let base = parts.join("/");
    if let Some(found) = try_py_file(&base, rel_ids) {
        return Resolution::Internal(found);
    }
    Resolution::External(format!("pip:{}", parts.first().copied().unwrap_or(dotted)))
}

fn resolve_from(importer_id: &str, dots: usize, module: &str, name: &str, rel_ids: &HashSet<String>, roots: &BTreeSet<String>) -> Resolution {
    if dots == 0 {
        // "from a.b import c" — prefer submodule a/b/c.py, else a.b's module file.
        if !module.is_empty() && name != "*" && !name.is_empty() {
            let submodule = format!("{module}.{name}");
            if let Resolution::Internal(found) = resolve_absolute(&submodule, rel_ids, roots) {
                return Resolution::Internal(found);
            }
        }
        return resolve_absolute(module, rel_ids, roots);
    }

    // Relative: walk up (dots - 1) extra directories from the importer's own
    // package directory, then join the (possibly empty) module segment.
    let importer_dir = importer_id.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let mut up = String::from("..");
    for _ in 1..dots {
        up.push_str("/..");
    }
    let base_dir = join_rel(importer_dir, &up);
    let target_dir = if module.is_empty() { base_dir.clone() } else { join_rel(&base_dir, &module.replace('.', "/")) };

    if !name.is_empty() && name != "*" {
        let candidate = if target_dir.is_empty() { name.to_string() } else { format!("{target_dir}/{name}") };
        if let Some(found) = try_py_file(&candidate, rel_ids) {
            return Resolution::Internal(found);
        }
    }
    if let Some(found) = try_py_file(&target_dir, rel_ids) {
        return Resolution::Internal(found);
    }
    Resolution::External(format!("pip:{}", module.split('.').next().unwrap_or(module)))
}

fn try_py_file(base: &str, rel_ids: &HashSet<String>) -> Option<String> {
    let as_module = format!("{base}.py");
    if rel_ids.contains(&as_module) {
        return Some(as_module);
    }
    let as_package = format!("{base}/__init__.py");
    if rel_ids.contains(&as_package) {
        return Some(as_package);
    }
    None
}

/// Outermost ancestor directory of each `__init__.py` chain (prefer the
/// outermost root when packages nest), per spec §4.2's Python notes.
fn package_roots(rel_ids: &HashSet<String>) -> BTreeSet<String> {
    let mut roots = BTreeSet::new();
    for id in rel_ids {
        if let Some(dir) = id.strip_suffix("/__init__.py") {
            let mut outermost = dir.to_string();
            let mut cur = dir;
            while let Some(parent) = cur.rsplit_once('/').map(|(p, _)| p) {
                if rel_ids.contains(&format!("{parent}/__init__.py")) {
                    outermost = parent.to_string();
                    cur = parent;
                } else {
                    break;
                }
            }
            roots.insert(outermost);
        }
    }
    roots
}

fn script_entries(root: &Path, rel_ids: &HashSet<String>) -> BTreeSet<String> {
    let mut entries = BTreeSet::new();
    if let Ok(text) = std::fs::read_to_string(root.join("pyproject.toml")) {
        if let Ok(value) = text.parse::<toml::Value>() {
            if let Some(scripts) = value.get("project").and_then(|p| p.get("scripts")).and_then(|s| s.as_table()) {
                collect_script_targets(scripts, root, rel_ids, &mut entries);
            }
            if let Some(scripts) = value
                .get("tool")
                .and_then(|t| t.get("poetry"))
                .and_then(|p| p.get("scripts"))
                .and_then(|s| s.as_table())
            {
                collect_script_targets(scripts, root, rel_ids, &mut entries);
            }
        }
    }
    if let Ok(text) = std::fs::read_to_string(root.join("setup.cfg")) {
        for line in text.lines() {
            if let Some((_, target)) = line.split_once('=') {
                let target = target.trim();
                if let Some((module, _func)) = target.split_once(':') {
                    if let Resolution::Internal(found) = resolve_absolute(module.trim(), rel_ids, &package_roots(rel_ids)) {
                        entries.insert(found);
                    }
                }
            }
        }
    }
    entries
}

fn collect_script_targets(scripts: &toml::map::Map<String, toml::Value>, _root: &Path, rel_ids: &HashSet<String>, entries: &mut BTreeSet<String>) {
    let roots = package_roots(rel_ids);
    for value in scripts.values() {
        if let Some(target) = value.as_str() {
            if let Some((module, _func)) = target.split_once(':') {
                if let Resolution::Internal(found) = resolve_absolute(module.trim(), rel_ids, &roots) {
                    entries.insert(found);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_relative_import_and_main_guard_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(pkg.join("__init__.py"), "").unwrap();
        std::fs::write(pkg.join("a.py"), "from .b import f\n").unwrap();
        std::fs::write(pkg.join("b.py"), "def f(): pass\n").unwrap();
        std::fs::write(pkg.join("c.py"), "if __name__ == \"__main__\":\n    from pkg import a\n").unwrap();

        let skip = fsutil::default_skip_dirs();
        let g = crawl(dir.path(), &skip);

        assert!(g.nodes.contains_key("pkg/a.py"));
        assert!(g.nodes.contains_key("pkg/b.py"));
        assert!(g.nodes.contains_key("pkg/c.py"));
        assert!(g.nodes.contains_key("pkg/__init__.py"));
        assert!(g.edges.iter().any(|e| e.source == "pkg/a.py" && e.target == "pkg/b.py" && e.kind == EdgeKind::FromRelative));
        assert!(g.entrypoints.contains("pkg/c.py"));
        assert_eq!(g.nodes["pkg/a.py"].state, crate::model::NodeState::Used);
        assert_eq!(g.nodes["pkg/b.py"].state, crate::model::NodeState::Used);
    }

    #[test]
    fn package_roots_prefers_outermost() {
        let mut ids = HashSet::new();
        ids.insert("pkg/__init__.py".to_string());
        ids.insert("pkg/sub/__init__.py".to_string());
        ids.insert("pkg/sub/mod.py".to_string());
        let roots = package_roots(&ids);
        assert_eq!(roots.len(), 1);
        assert!(roots.contains("pkg"));
    }
}
