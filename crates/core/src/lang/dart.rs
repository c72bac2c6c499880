//! Self-hosted-language (L-self) crawler, realized as Dart — spec §4.2/§4.3
//! "Self-hosted" rows. Dart stands in for L-self because this repo's own
//! crawlers are the clearest "analyzer written in the language it
//! analyzes" example available; files reachable only through a resolved
//! edge (not a declared entrypoint) are escalated from `unused` to `used`
//! so a connected-but-unlisted helper module isn't flagged dead.

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::{join_rel, Resolution};
use crate::model::{Certainty, Edge, EdgeKind, ExportSummary, FileFacts, Graph, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["dart"];

static IMPORT_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
static EXPORT_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*export\s+['"]([^'"]+)['"]"#).unwrap());
static PART_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*part\s+['"]([^'"]+)['"]"#).unwrap());
static PART_OF_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*part\s+of\s+['"]([^'"]+)['"]"#).unwrap());
static MAIN_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:Future<\w*>\s*|void\s+)?main\s*\(").unwrap());
static CLASS_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:abstract\s+)?class\s+(\w+)").unwrap());
static TOP_FN_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:\w[\w<>,\s]*\s+)?(\w+)\s*\([^;{]*\)\s*(?:async\s*)?\{").unwrap());
static TYPEDEF_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*typedef\s+(\w+)").unwrap());
static EXTENSION_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*extension\s+(\w+)").unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    crawl_with_entries(root, skip_dirs, &BTreeSet::new())
}

/// Explicit entry arguments supplement auto-discovery, per spec §4.2.
pub fn crawl_with_entries(root: &Path, skip_dirs: &HashSet<String>, explicit_entries: &BTreeSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();
    let package_name = read_package_name(root);

    let mut graph = Graph::new();
    let mut entries: BTreeSet<String> = explicit_entries.clone();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();
    let mut exports: HashMap<String, ExportSummary> = HashMap::new();

    for path in &files {
        let (facts, is_entry, summary) = extract(root, path);
        if is_entry || is_layout_entry(&facts.rel_id, package_name.as_deref()) {
            entries.insert(facts.rel_id.clone());
        }
        exports.insert(facts.rel_id.clone(), summary);
        let mut node = Node::file(facts.rel_id.clone(), Lang::Dart);
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
            match resolve(id, &imp.specifier, package_name.as_deref(), &rel_ids) {
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

    if entries.is_empty() {
        if let Some(first) = rel_ids.iter().min() {
            entries.insert(first.clone());
        }
    }
    for e in &entries {
        graph.entrypoints.insert(e.clone());
    }
    graph.exports = exports;
    graph::finalize(&mut graph, &graph.entrypoints.clone(), false);
    graph::escalate_connected_unused(&mut graph);
    graph
}

fn extract(root: &Path, path: &PathBuf) -> (FileFacts, bool, ExportSummary) {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    let sanitized = crate::sanitize::sanitize(&raw, crate::sanitize::SanitizeOptions::dart());
    let id = rel_id(root, path);
    let is_entry = MAIN_FN.is_match(&sanitized);

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        let line_no = line_no + 1;
        if let Some(c) = IMPORT_DIRECTIVE.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Import, certainty: Certainty::Static, line: line_no });
        }
        if let Some(c) = EXPORT_DIRECTIVE.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Export, certainty: Certainty::Static, line: line_no });
        }
        if let Some(c) = PART_OF_PATH.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::PartOf, certainty: Certainty::Static, line: line_no });
        } else if let Some(c) = PART_DIRECTIVE.captures(line) {
            imports.push(ImportRef { specifier: c[1].to_string(), kind: EdgeKind::Part, certainty: Certainty::Static, line: line_no });
        }
    }

    let mut summary: ExportSummary = ExportSummary::new();
    collect_category(&sanitized, &CLASS_DECL, "classes", &mut summary);
    collect_category(&sanitized, &TOP_FN_DECL, "functions", &mut summary);
    collect_category(&sanitized, &TYPEDEF_DECL, "typedefs", &mut summary);
    collect_category(&sanitized, &EXTENSION_DECL, "extensions", &mut summary);

    let findings = crate::security::dart::scan(&id, &raw, &sanitized);

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
            findings,
            has_side_effects: false,
        },
        is_entry,
        summary,
    )
}

fn collect_category(text: &str, re: &Regex, category: &'static str, summary: &mut ExportSummary) {
    let names: Vec<serde_json::Value> = re.captures_iter(text).map(|c| serde_json::Value::String(c[1].to_string())).collect();
    if !names.is_empty() {
        summary.entry(category.to_string()).or_default().extend(names);
    }
}

fn read_package_name(root: &Path) -> Option<String> {
    let text = std::fs::read_to_string(root.join("pubspec.yaml")).ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("name:") {
            return Some(rest.trim().trim_matches('"').trim_matches('\'').to_string());
        }
    }
    None
}

fn is_layout_entry(rel_id: &str, package_name: Option<&str>) -> bool {
    if rel_id == "bin/main.dart" || rel_id == "lib/main.dart" {
        return true;
    }
    if let Some(name) = package_name {
        if rel_id == format!("lib/{name}.dart") {
            return true;
        }
    }
    rel_id.starts_with("bin/main.") || rel_id.starts_with("lib/main.")
}

fn resolve(importer_id: &str, specifier: &str, package_name: Option<&str>, rel_ids: &HashSet<String>) -> Resolution {
    if let Some(rest) = specifier.strip_prefix("dart:") {
        return Resolution::External(format!("dart:{rest}"));
    }
    if let Some(rest) = specifier.strip_prefix("package:") {
        if let Some((pkg, path)) = rest.split_once('/') {
            if Some(pkg) == package_name {
                let candidate = format!("lib/{path}");
                if rel_ids.contains(&candidate) {
                    return Resolution::Internal(candidate);
                }
            }
        }
        return Resolution::External(format!("package:{rest}"));
    }
    if specifier.contains(':') {
        // Any other URI scheme (e.g. asset:, flutter:) kept verbatim.
        let scheme = specifier.split(':').next().unwrap_or("external");
        return Resolution::External(format!("{scheme}:{specifier}"));
    }

    let base_dir = importer_id.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let candidate = join_rel(base_dir, specifier);
    if rel_ids.contains(&candidate) {
        Resolution::Internal(candidate)
    } else {
        Resolution::External(format!("external:{specifier}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dart_stdlib_and_package_scheme_external_ids() {
        let rel_ids = HashSet::new();
        assert_eq!(resolve("a.dart", "dart:io", None, &rel_ids), Resolution::External("dart:io".to_string()));
        assert_eq!(resolve("a.dart", "package:http/http.dart", None, &rel_ids), Resolution::External("package:http/http.dart".to_string()));
    }

    #[test]
    fn self_package_reference_resolves_internally() {
        let mut rel_ids = HashSet::new();
        rel_ids.insert("lib/src/client.dart".to_string());
        let r = resolve("lib/main.dart", "package:mypkg/src/client.dart", Some("mypkg"), &rel_ids);
        assert_eq!(r, Resolution::Internal("lib/src/client.dart".to_string()));
    }

    #[test]
    fn relative_import_resolves_within_lib_dir() {
        let mut rel_ids = HashSet::new();
        rel_ids.insert("lib/src/util.dart".to_string());
        let r = resolve("lib/main.dart", "src/util.dart", None, &rel_ids);
        assert_eq!(r, Resolution::Internal("lib/src/util.dart".to_string()));
    }

    #[test]
    fn layout_entries_recognized() {
        assert!(is_layout_entry("bin/main.dart", None));
        assert!(is_layout_entry("lib/mypkg.dart", Some("mypkg")));
        assert!(!is_layout_entry("lib/other.dart", Some("mypkg")));
    }
}
