//! Java crawler (spec §4.2/§4.3 Java rows).

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::Resolution;
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, IdentityField, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["java"];

static PACKAGE_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").unwrap());
static IMPORT_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*import\s+(static\s+)?([\w.]+)(\.\*)?\s*;").unwrap());
static MAIN_SIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"public\s+static\s+void\s+main\s*\(\s*String(?:\[\]|\.\.\.)\s*\w*\s*\)").unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);

    let mut graph = Graph::new();
    let mut entries: BTreeSet<String> = BTreeSet::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();
    let mut fqn_to_file: HashMap<String, String> = HashMap::new();
    let mut fqns: Vec<(String, String)> = Vec::new(); // (fqn, file_id)

    for path in &files {
        let (facts, is_entry, package) = extract(root, path);
        if is_entry {
            entries.insert(facts.rel_id.clone());
        }
        if let Some(pkg) = &package {
            let class_name = class_name_from_path(&facts.rel_id);
            let fqn = if pkg.is_empty() { class_name.clone() } else { format!("{pkg}.{class_name}") };
            fqn_to_file.insert(fqn.clone(), facts.rel_id.clone());
            fqns.push((fqn, facts.rel_id.clone()));
        }
        let mut node = Node::file(facts.rel_id.clone(), Lang::Java);
        node.size_loc = Some(facts.loc);
        node.sha256 = facts.sha256.clone();
        node.identity = package.clone().map(|p| IdentityField { key: "package", value: p });
        graph.upsert_node(node);
        facts_by_id.insert(facts.rel_id.clone(), facts);
    }

    for (id, facts) in &facts_by_id {
        for imp in &facts.imports {
            for target in resolve(&imp.specifier, imp.kind, &fqn_to_file, &fqns) {
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

    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();
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

fn class_name_from_path(rel_id: &str) -> String {
    rel_id.rsplit('/').next().unwrap_or(rel_id).trim_end_matches(".java").to_string()
}

fn extract(root: &Path, path: &PathBuf) -> (FileFacts, bool, Option<String>) {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    let sanitized = crate::sanitize::sanitize(&raw, crate::sanitize::SanitizeOptions::c_like());
    let id = rel_id(root, path);
    let is_entry = MAIN_SIG.is_match(&sanitized);
    let package = PACKAGE_DECL.captures(&sanitized).map(|c| c[1].to_string()).or(Some(String::new()));

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        if let Some(c) = IMPORT_DECL.captures(line) {
            let is_static = c.get(1).is_some();
            let fqn = c[2].to_string();
            let is_wildcard = c.get(3).is_some();
            let specifier = if is_wildcard { format!("{fqn}.*") } else { fqn };
            let kind = if is_static {
                EdgeKind::ImportStatic
            } else if is_wildcard {
                EdgeKind::ImportWildcard
            } else {
                EdgeKind::Import
            };
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

fn resolve(specifier: &str, kind: EdgeKind, fqn_to_file: &HashMap<String, String>, fqns: &[(String, String)]) -> Vec<Resolution> {
    let mut fqn = specifier.to_string();
    let is_wildcard = fqn.ends_with(".*");
    if kind == EdgeKind::ImportStatic {
        // import static a.b.C.member -> strip the trailing member.
        if let Some((prefix, _member)) = fqn.rsplit_once('.') {
            fqn = prefix.to_string();
        }
    }

    if is_wildcard {
        let prefix = fqn.trim_end_matches(".*");
        let prefix_dot = format!("{prefix}.");
        let matches: Vec<Resolution> = fqns
            .iter()
            .filter(|(f, _)| f.starts_with(&prefix_dot))
            .map(|(_, file)| Resolution::Internal(file.clone()))
            .collect();
        if !matches.is_empty() {
            return matches;
        }
        return vec![Resolution::External(external_id(prefix))];
    }

    if let Some(file) = fqn_to_file.get(&fqn) {
        return vec![Resolution::Internal(file.clone())];
    }
    vec![Resolution::External(external_id(&fqn))]
}

/// `java.*`/`javax.*` -> `java:<first.two>`; else `mvn:<first.two>` or `mvn:<first>`.
fn external_id(fqn: &str) -> String {
    let segs: Vec<&str> = fqn.split('.').collect();
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
    fn java_stdlib_external_id() {
        assert_eq!(external_id("java.util.List"), "java:java.util");
        assert_eq!(external_id("javax.annotation.Nonnull"), "java:javax.annotation");
    }

    #[test]
    fn third_party_external_id() {
        assert_eq!(external_id("org.apache.commons.lang3.StringUtils"), "mvn:org.apache");
    }

    #[test]
    fn wildcard_import_expands_to_internal_fqns() {
        let mut map = HashMap::new();
        map.insert("com.example.A".to_string(), "src/A.java".to_string());
        map.insert("com.example.B".to_string(), "src/B.java".to_string());
        let fqns = vec![("com.example.A".to_string(), "src/A.java".to_string()), ("com.example.B".to_string(), "src/B.java".to_string())];
        let mut results = resolve("com.example.*", EdgeKind::Import, &map, &fqns);
        results.sort_by_key(|r| format!("{r:?}"));
        assert_eq!(results.len(), 2);
    }
}
