//! C# crawler (spec §4.2/§4.3 C# rows). `using` directives resolve to static
//! edges as usual, but C# also allows same-namespace types to reference each
//! other with no `using` at all, so files sharing a declared namespace get an
//! additional heuristic `namespace_peer` edge between them.

use crate::fsutil::{self, rel_id};
use crate::graph;
use crate::lang::Resolution;
use crate::model::{Certainty, Edge, EdgeKind, FileFacts, Graph, IdentityField, ImportRef, Lang, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["cs"];

static NAMESPACE_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*namespace\s+([\w.]+)\s*[{;]?").unwrap());
static USING_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(global\s+)?using\s+(static\s+)?(?:(\w+)\s*=\s*)?([\w.]+)\s*;").unwrap());
static MAIN_SIG: Lazy<Regex> = Lazy::new(|| Regex::new(r"static\s+(?:async\s+)?(?:void|Task(?:<\w+>)?|int)\s+Main\s*\(").unwrap());

pub fn crawl(root: &Path, skip_dirs: &HashSet<String>) -> Graph {
    let ext_set: HashSet<&'static str> = EXTENSIONS.iter().copied().collect();
    let files = fsutil::walk_source_files(root, skip_dirs, &ext_set);
    let rel_ids: HashSet<String> = files.iter().map(|p| rel_id(root, p)).collect();

    let mut graph = Graph::new();
    let mut entries: BTreeSet<String> = BTreeSet::new();
    let mut facts_by_id: HashMap<String, FileFacts> = HashMap::new();
    let mut namespace_files: HashMap<String, Vec<String>> = HashMap::new();

    for path in &files {
        let (facts, is_entry, namespace) = extract(root, path);
        if is_entry {
            entries.insert(facts.rel_id.clone());
        }
        if let Some(ns) = &namespace {
            namespace_files.entry(ns.clone()).or_default().push(facts.rel_id.clone());
        }
        let mut node = Node::file(facts.rel_id.clone(), Lang::Csharp);
        node.size_loc = Some(facts.loc);
        node.sha256 = facts.sha256.clone();
        node.identity = namespace.map(|n| IdentityField { key: "namespace", value: n });
        graph.upsert_node(node);
        facts_by_id.insert(facts.rel_id.clone(), facts);
    }

    if has_exe_output_type(root) {
        if let Some(program_cs) = rel_ids.iter().find(|f| f.ends_with("Program.cs")) {
            entries.insert(program_cs.clone());
        }
    }

    let anchors = choose_anchors(&namespace_files);

    for (id, facts) in &facts_by_id {
        for imp in &facts.imports {
            match resolve(&imp.specifier, imp.kind, &anchors) {
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

    // Mutual `namespace_peer` heuristic edges for files sharing a namespace.
    for files in namespace_files.values() {
        for a in files {
            for b in files {
                if a != b {
                    graph.add_edge(Edge { source: a.clone(), target: b.clone(), kind: EdgeKind::NamespacePeer, certainty: Certainty::Heuristic });
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
    let is_entry = MAIN_SIG.is_match(&sanitized);
    let namespace = NAMESPACE_DECL.captures(&sanitized).map(|c| c[1].to_string());

    let mut imports = Vec::new();
    for (line_no, line) in sanitized.lines().enumerate() {
        if let Some(c) = USING_DECL.captures(line) {
            let is_static = c.get(2).is_some();
            let fqn = c[4].to_string();
            let kind = if is_static { EdgeKind::UsingStatic } else { EdgeKind::Using };
            imports.push(ImportRef { specifier: fqn, kind, certainty: Certainty::Static, line: line_no + 1 });
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
        namespace,
    )
}

/// Anchor file per namespace: the file whose stem case-insensitively equals
/// the namespace's last segment, else the first file declaring it.
fn choose_anchors(namespace_files: &HashMap<String, Vec<String>>) -> HashMap<String, String> {
    let mut anchors = HashMap::new();
    for (ns, files) in namespace_files {
        let last_segment = ns.rsplit('.').next().unwrap_or(ns).to_ascii_lowercase();
        let anchor = files
            .iter()
            .find(|f| {
                f.rsplit('/')
                    .next()
                    .unwrap_or(f)
                    .trim_end_matches(".cs")
                    .to_ascii_lowercase()
                    == last_segment
            })
            .cloned()
            .or_else(|| files.first().cloned());
        if let Some(anchor) = anchor {
            anchors.insert(ns.clone(), anchor);
        }
    }
    anchors
}

fn resolve(specifier: &str, kind: EdgeKind, anchors: &HashMap<String, String>) -> Resolution {
    if kind == EdgeKind::UsingStatic {
        if let Some((ns_prefix, _member)) = specifier.rsplit_once('.') {
            if let Some(anchor) = anchors.get(ns_prefix) {
                return Resolution::Internal(anchor.clone());
            }
        }
    }
    if let Some(anchor) = anchors.get(specifier) {
        return Resolution::Internal(anchor.clone());
    }
    Resolution::External(external_id(specifier))
}

fn external_id(ns: &str) -> String {
    if ns == "System" || ns.starts_with("System.") {
        return "dotnet:System".to_string();
    }
    let segs: Vec<&str> = ns.split('.').collect();
    if segs.len() >= 2 {
        format!("nuget:{}.{}", segs[0], segs[1])
    } else {
        format!("nuget:{}", segs.first().unwrap_or(&ns))
    }
}

fn has_exe_output_type(root: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(root) else { return false };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csproj") {
            if let Ok(text) = std::fs::read_to_string(&path) {
                if text.contains("<OutputType>Exe</OutputType>") {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_namespace_maps_to_dotnet_system() {
        assert_eq!(external_id("System.Collections.Generic"), "dotnet:System");
    }

    #[test]
    fn third_party_namespace_external_id() {
        assert_eq!(external_id("Newtonsoft.Json"), "nuget:Newtonsoft.Json");
    }

    #[test]
    fn anchor_chosen_by_matching_stem() {
        let mut namespaces = HashMap::new();
        namespaces.insert("Acme.Widgets".to_string(), vec!["src/Other.cs".to_string(), "src/Widgets.cs".to_string()]);
        let anchors = choose_anchors(&namespaces);
        assert_eq!(anchors.get("Acme.Widgets"), Some(&"src/Widgets.cs".to_string()));
    }
}
