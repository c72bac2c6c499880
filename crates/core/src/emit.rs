//! Deterministic per-language JSON artifact emission (spec §4.8, §6).

use crate::model::{Edge, ExportSummary, Finding, Graph, Lang, Node};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Serialize)]
struct Artifact<'a> {
    nodes: Vec<&'a Node>,
    edges: &'a [Edge],
    #[serde(skip_serializing_if = "Option::is_none")]
    libraries: Option<&'a [serde_json::Value]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entries: Vec<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    exports: BTreeMap<&'a str, &'a ExportSummary>,
    #[serde(rename = "securityFindings", skip_serializing_if = "BTreeMap::is_empty")]
    security_findings: BTreeMap<&'a str, &'a Vec<Finding>>,
}

/// Legacy Python artifact shape, kept for older tooling that reads
/// `pythonDependencies.json`: same nodes/edges, `pythonExports` in place of
/// `exports`, no `securityFindings`.
#[derive(Serialize)]
struct PythonLegacyArtifact<'a> {
    nodes: Vec<&'a Node>,
    edges: &'a [Edge],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entries: Vec<&'a str>,
    #[serde(rename = "pythonExports", skip_serializing_if = "BTreeMap::is_empty")]
    python_exports: BTreeMap<&'a str, &'a ExportSummary>,
}

/// Fixed artifact filename per language, spec §6.
pub fn filename_for(lang: Lang) -> &'static str {
    match lang {
        Lang::Javascript => "jsDependencies.json",
        Lang::Python => "pyDependencies.json",
        Lang::Go => "goDependencies.json",
        Lang::Rust => "rustDependencies.json",
        Lang::Java => "javaDependencies.json",
        Lang::Kotlin => "kotlinDependencies.json",
        Lang::Csharp => "csharpDependencies.json",
        Lang::Dart => "dartDependencies.json",
        Lang::External => "dependencies.json",
    }
}

fn to_artifact<'a>(graph: &'a Graph, libraries: Option<&'a [serde_json::Value]>) -> Artifact<'a> {
    Artifact {
        nodes: graph.nodes.values().collect(),
        edges: &graph.edges,
        libraries,
        entries: graph.entrypoints.iter().map(String::as_str).collect(),
        exports: graph.exports.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        security_findings: graph.findings.iter().map(|(k, v)| (k.as_str(), v)).collect(),
    }
}

/// Serializes `graph` to the two-space-indented JSON shape of spec §6.
pub fn to_json(graph: &Graph, libraries: Option<&[serde_json::Value]>) -> String {
    serde_json::to_string_pretty(&to_artifact(graph, libraries)).expect("artifact serialization cannot fail")
}

/// Writes a language's artifact to `<root>/<filename_for(lang)>`.
pub fn write_artifact(root: &Path, lang: Lang, graph: &Graph, libraries: Option<&[serde_json::Value]>) -> std::io::Result<()> {
    let json = to_json(graph, libraries);
    std::fs::write(root.join(filename_for(lang)), json)
}

/// Writes the non-canonical `pythonDependencies.json` sidecar artifact.
pub fn write_python_legacy_artifact(root: &Path, graph: &Graph) -> std::io::Result<()> {
    let artifact = PythonLegacyArtifact {
        nodes: graph.nodes.values().collect(),
        edges: &graph.edges,
        entries: graph.entrypoints.iter().map(String::as_str).collect(),
        python_exports: graph.exports.iter().map(|(k, v)| (k.as_str(), v)).collect(),
    };
    let json = serde_json::to_string_pretty(&artifact).expect("artifact serialization cannot fail");
    std::fs::write(root.join("pythonDependencies.json"), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lang as L, Node};

    #[test]
    fn artifact_json_preserves_key_order_and_indentation() {
        let mut graph = Graph::new();
        graph.upsert_node(Node::file("a.js", L::Javascript));
        let json = to_json(&graph, None);
        let nodes_pos = json.find("\"nodes\"").unwrap();
        let edges_pos = json.find("\"edges\"").unwrap();
        assert!(nodes_pos < edges_pos);
        assert!(json.starts_with('{'));
        assert!(json.contains("  \"nodes\""));
    }

    #[test]
    fn empty_optional_sections_are_omitted() {
        let mut graph = Graph::new();
        graph.upsert_node(Node::file("a.js", L::Javascript));
        let json = to_json(&graph, None);
        assert!(!json.contains("securityFindings"));
        assert!(!json.contains("\"exports\""));
    }
}
