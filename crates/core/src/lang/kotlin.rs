//! Kotlin crawler (spec §4.2/§4.3 Kotlin rows).

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::Resolution;
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, IdentityField, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["kt", "kts"];

static PACKAGE_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)").unwrap());
static IMPORT_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*import\s+([\w.]+)(\.\*)?(?:\s+as\s+\w+)?").unwrap());
static FUN_MAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*fun\s+main\s*\(").unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();

    let mut graph = Graph::new();
    let mut entries: BTreeSet<String> = BTreeSet::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();
    let mut fqn_to_file: HashMap<String, String> = HashMap::new();
    let mut package_dirs: HashMap<String, Vec<String>> = HashMap::new();
    let mut fqns: Vec<(String, String)> = Vec::new();

    for path in &files {
        let (facts, is_entry, package) = extract(root, path);
        if is_entry {
            entries.insert(facts.rel_id.clone());
        }
        let pkg = package.clone().unwrap_or_default();
        let class_name = facts.rel_id.rsplit('/').next().unwrap_or(&facts.rel_id).trim_end_matches(".kt").trim_end_matches(".kts").to_string();
        let fqn = if pkg.is_empty() { class_name } else { format!("{pkg}.{class_name}") };
        fqn_to_file.insert(fqn.clone(), facts.rel_id.clone());
        fqns.push((fqn, facts.rel_id.clone()));
        package_dirs.entry(pkg).or_default().push(facts.rel_id.clone());

        let mut node = Node::file(facts.rel_id.clone(), Lang::Kotlin);
        node.size_loc = Some(facts.loc);
        node.sha256 = facts.sha256.clone();
        node.identity = package.map(|p| IdentityField { key: "package", value: p });
        graph.upsert_node(node);
        facts_by_id.insert(facts.rel_id.clone(), facts);
    }

    for (id, facts) in &facts_by_id {
        for imp in &facts.imports {
            for target in resolve(&imp.specifier, &fqn_to_file, &fqns, &package_dirs) {
                match target {
                    Resolution::Internal(t) => {
                        if &t != id {
                            graph.add_edge(Edge { source: id.clone(), target: t, kind: imp.kind, certainty: imp.certainty });
                        }
                    }
                    Resolution::External(ext_id) => {
                        graph.upsert_node(Node::external(ext_id.clone()));
                        graph.add_edge(Edge { source: id.clone(), target: ext_id, kind: imp.kind, certainty: imp.certainty });
                    }
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

fn extract(root: &Path, path: &PathBuf) -> (FileFacts, bool, Option<String>) {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    let sanitized = crate::sanitize::sanitize(&raw, crate::sanitize::SanitizeOptions::c_like());
    let id = rel_id(root, path);
    let is_entry = FUN_MAIN.is_match(&sanitized);
    let package = PACKAGE_DECL.captures(&sanitized).map(|c| c[1].to_string()).or(Some(String::new()));

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        if let Some(c) = IMPORT_DECL.captures(line) {
            let fqn = c[1].to_string();
            let is_wildcard = c.get(2).is_some();
            let specifier = if is_wildcard { format!("{fqn}.*") } else { fqn };
            let kind = if is_wildcard { EdgeKind::ImportWildcard } else { EdgeKind::Import };
            imports.push(ImportRef { specifier, kind, certainty: Certainty::Static, line: line_no + 1 });
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
        package,
    )
}

fn resolve(
    specifier: &str,
    fqn_to_file: &HashMap<String, String>,
    fqns: &[(String, String)],
    package_dirs: &HashMap<String, Vec<String>>,
) -> Vec<Resolution> {
    let is_wildcard = specifier.ends_with(".*");
    if is_wildcard {
        let prefix = specifier.trim_end_matches(".*");
        let prefix_dot = format!("{prefix}.");
        let mut matches: Vec<Resolution> =
            fqns.iter().filter(|(f, _)| f.starts_with(&prefix_dot)).map(|(_, file)| Resolution::Internal(file.clone())).collect();
        if matches.is_empty() {
            if let Some(files) = package_dirs.get(prefix) {
                matches = files.iter().cloned().map(Resolution::Internal).collect();
            }
        }
        if !matches.is_empty() {
            return matches;
        }
        return vec![Resolution::External(external_id(prefix))];
    }

    if let Some(file) = fqn_to_file.get(specifier) {
        return vec![Resolution::Internal(file.clone())];
    }
    vec![Resolution::External(external_id(specifier))]
}

fn external_id(fqn: &str) -> String {
    let segs: Vec<&str> = fqn.split('.').collect();
    if segs.first() == Some(&"kotlin") {
        let two = segs.iter().take(2).cloned().collect::<Vec<_>>().join(".");
        return format!("kotlin:{two}");
    }
    if segs.first() == Some(&"java") || segs.first() == Some(&"javax") {
        let two = segs.iter().take(2).cloned().collect::<Vec<_>>().join(".");
        return format!("java:{two}");
    }
    if segs.len() >= 2 {
        format!("mvn:{}.{}", segs[0], segs[1])
    } else {
        format!("mvn:{}", segs.first().unwrap_or(&fqn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kotlin_stdlib_external_id() {
        assert_eq!(external_id("kotlin.collections.List"), "kotlin:kotlin.collections");
    }

    #[test]
    fn package_directory_fallback_when_no_fqn_match() {
        let mut dirs = HashMap::new();
        dirs.insert("com.example".to_string(), vec!["src/A.kt".to_string()]);
        let fqn_to_file = HashMap::new();
        let fqns = Vec::new();
        let results = resolve("com.example.*", &fqn_to_file, &fqns, &dirs);
        assert_eq!(results, vec![Resolution::Internal("src/A.kt".to_string())]);
    }
}
