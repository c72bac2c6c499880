//! Graph merge engine (spec §4.6): canonicalization, and node/edge/findings/
//! exports/entrypoints merge policies over heterogeneous crawler artifacts.
//!
//! Artifacts are ingested as loosely-typed `serde_json::Value` rather than
//! the strongly-typed crawler [`crate::model::Graph`]: the merge contract
//! must tolerate key aliases, objects-as-ids, and malformed input from
//! sources other than this crate's own emitter (spec §4.6, §7).

use crate::model::{Finding, Severity};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One merged node. `id` is the first-seen display form; merge identity is
/// `canonical(id)`, tracked only as the `nodes` map's key.
#[derive(Debug, Clone)]
pub struct MergedNode {
    pub id: String,
    pub node_type: String,
    pub state: String,
    pub lang: Option<String>,
    pub size_loc: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct MergedEdge {
    pub source: String,
    pub target: String,
    pub kind: String,
    /// Allow-listed pass-through fields preserved verbatim (spec §4.6).
    pub extra: BTreeMap<String, Value>,
}

const EDGE_PASSTHROUGH_FIELDS: &[&str] = &[
    "dynamic", "reflection", "mode", "phase", "stage", "scope", "context", "profiles", "profile", "when", "flags",
    "test", "build", "id", "weight", "strength", "evidence", "notes", "metadata", "tags", "kind", "certainty",
];

#[derive(Debug, Default)]
pub struct GraphState {
    pub nodes: BTreeMap<String, MergedNode>,
    edge_keys: HashSet<(String, String, String)>,
    pub edges: Vec<MergedEdge>,
    pub security_findings: BTreeMap<String, Vec<Finding>>,
    pub exports: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
    pub entrypoints: BTreeSet<String>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the session, per spec §3's GraphState lifecycle note.
    pub fn reset(&mut self) {
        *self = GraphState::default();
    }

    pub fn ingest_artifact(&mut self, artifact: &Value) {
        if let Some(nodes) = artifact.get("nodes").and_then(|v| v.as_array()) {
            for n in nodes {
                self.ingest_node(n);
            }
        }
        if let Some(edges) = artifact.get("edges").and_then(|v| v.as_array()) {
            for e in edges {
                self.ingest_edge(e);
            }
        }
        self.ingest_findings(artifact);
        if let Some(exports) = artifact.get("exports").and_then(|v| v.as_object()) {
            self.ingest_exports(exports);
        }
        self.ingest_entrypoints(artifact);
    }

    fn ingest_node(&mut self, raw: &Value) {
        let Some(obj) = raw.as_object() else { return };
        let Some(id) = obj.get("id").and_then(|v| v.as_str()) else { return };
        let canon = canonicalize(id);
        let state = obj.get("state").and_then(|v| v.as_str()).unwrap_or("unused").to_string();
        let lang = obj.get("lang").and_then(|v| v.as_str()).map(str::to_string);
        let node_type = obj.get("type").and_then(|v| v.as_str()).unwrap_or("file").to_string();
        let size_loc = obj.get("sizeLOC").and_then(|v| v.as_u64());

        let mut extra = BTreeMap::new();
        for (k, v) in obj {
            if !matches!(k.as_str(), "id" | "state" | "lang" | "type" | "sizeLOC") {
                extra.insert(k.clone(), v.clone());
            }
        }

        self.nodes
            .entry(canon)
            .and_modify(|existing| {
                existing.state = merge_state(&existing.state, &state);
                if let (Some(a), Some(b)) = (existing.size_loc, size_loc) {
                    existing.size_loc = Some(a.max(b));
                } else if existing.size_loc.is_none() {
                    existing.size_loc = size_loc;
                }
                for (k, v) in extra {
                    existing.extra.entry(k).or_insert(v);
                }
            })
            .or_insert(MergedNode { id: id.to_string(), node_type, state, lang, size_loc, extra });
    }

    fn ingest_edge(&mut self, raw: &Value) {
        let Some(source) = extract_id_like(raw, &["source", "from", "src", "u"]) else { return };
        let Some(target) = extract_id_like(raw, &["target", "to", "dst", "v"]) else { return };
        let kind = raw.get("kind").and_then(|v| v.as_str()).unwrap_or("import").to_string();
        // Store canonical endpoints, not the raw per-artifact spelling: nodes
        // are keyed by canonical id, so a non-canonical edge endpoint would
        // never match any emitted node's `id` (spec §8 invariant #1).
        let source = canonicalize(&source);
        let target = canonicalize(&target);
        let key = (source.clone(), target.clone(), kind.clone());
        if !self.edge_keys.insert(key) {
            return;
        }
        let mut extra = BTreeMap::new();
        if let Some(obj) = raw.as_object() {
            for field in EDGE_PASSTHROUGH_FIELDS {
                if let Some(v) = obj.get(*field) {
                    extra.insert(field.to_string(), v.clone());
                }
            }
        }
        self.edges.push(MergedEdge { source, target, kind, extra });
    }

    fn ingest_findings(&mut self, artifact: &Value) {
        if let Some(map) = artifact.get("securityFindings").and_then(|v| v.as_object()) {
            for (file_id, list) in map {
                if let Some(arr) = list.as_array() {
                    for f in arr {
                        if let Some(finding) = parse_finding(f, None) {
                            self.add_finding(&canonicalize(file_id), finding);
                        }
                    }
                }
            }
        }
        // Per-node `security.findings` harvested from node objects.
        if let Some(nodes) = artifact.get("nodes").and_then(|v| v.as_array()) {
            for n in nodes {
                let Some(id) = n.get("id").and_then(|v| v.as_str()) else { continue };
                let nested = n.get("securityFindings").or_else(|| n.get("security").and_then(|s| s.get("findings")));
                if let Some(arr) = nested.and_then(|v| v.as_array()) {
                    for f in arr {
                        if let Some(finding) = parse_finding(f, Some(id)) {
                            self.add_finding(&canonicalize(id), finding);
                        }
                    }
                }
            }
        }
        // A global flat list whose items carry their own location field.
        if let Some(arr) = artifact.get("findings").and_then(|v| v.as_array()) {
            for f in arr {
                let loc = f
                    .get("path")
                    .or_else(|| f.get("file"))
                    .or_else(|| f.get("source"))
                    .and_then(|v| v.as_str());
                if let (Some(loc), Some(finding)) = (loc, parse_finding(f, loc.into())) {
                    self.add_finding(&canonicalize(loc), finding);
                }
            }
        }
    }

    fn add_finding(&mut self, canon_id: &str, finding: Finding) {
        let list = self.security_findings.entry(canon_id.to_string()).or_default();
        if !list.iter().any(|existing| existing.merge_key() == finding.merge_key()) {
            list.push(finding);
        }
    }

    fn ingest_exports(&mut self, exports: &serde_json::Map<String, Value>) {
        for (id, categories) in exports {
            let Some(cat_obj) = categories.as_object() else { continue };
            let entry = self.exports.entry(canonicalize(id)).or_default();
            for (category, values) in cat_obj {
                if let Some(arr) = values.as_array() {
                    entry.entry(category.clone()).or_default().extend(arr.iter().cloned());
                }
            }
        }
    }

    fn ingest_entrypoints(&mut self, artifact: &Value) {
        for key in ["entrypoints", "entryPoints", "entry_points", "entries", "entrances"] {
            if let Some(v) = artifact.get(key) {
                for id in extract_entrypoint_ids(v) {
                    self.entrypoints.insert(canonicalize(&id));
                }
            }
        }
    }
}

fn merge_state(a: &str, b: &str) -> String {
    fn rank(s: &str) -> u8 {
        match s {
            "used" => 2,
            "side_effect_only" => 1,
            _ => 0,
        }
    }
    if rank(a) >= rank(b) { a.to_string() } else { b.to_string() }
}

/// Recursive node-id extraction: tries each alias key directly, falling back
/// to walking an object's own fields for an id-shaped candidate (spec §4.6).
fn extract_id_like(raw: &Value, aliases: &[&str]) -> Option<String> {
    let obj = raw.as_object()?;
    for key in aliases {
        match obj.get(*key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Object(inner)) => {
                if let Some(id) = inner.get("id").and_then(|v| v.as_str()) {
                    return Some(id.to_string());
                }
                if let Some(path) = inner.get("path").and_then(|v| v.as_str()) {
                    return Some(path.to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_finding(raw: &Value, fallback_file: Option<&str>) -> Option<Finding> {
    let obj = raw.as_object()?;
    let rule_id = obj.get("ruleId").or_else(|| obj.get("id")).and_then(|v| v.as_str())?.to_string();
    let severity_raw = obj.get("severity").and_then(|v| v.as_str()).unwrap_or("unknown");
    let message = obj.get("message").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    if rule_id.is_empty() && message.is_empty() {
        return None;
    }
    let file = obj
        .get("file")
        .and_then(|v| v.as_str())
        .or(fallback_file)
        .unwrap_or_default()
        .to_string();
    let line = obj.get("line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let snippet = obj.get("snippet").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let code = obj.get("code").and_then(|v| v.as_str()).map(str::to_string);
    Some(Finding {
        rule_id,
        severity: Severity::normalize(severity_raw),
        message,
        file,
        line,
        column: obj.get("column").and_then(|v| v.as_u64()).map(|c| c as usize),
        snippet,
        code,
        start_offset: 0,
        end_offset: 0,
    })
}

fn extract_entrypoint_ids(v: &Value) -> Vec<String> {
    match v {
        Value::String(s) => vec![s.clone()],
        Value::Array(arr) => arr.iter().flat_map(extract_entrypoint_ids).collect(),
        Value::Object(obj) => {
            if let Some(list) = obj.get("list") {
                return extract_entrypoint_ids(list);
            }
            obj.get("id")
                .or_else(|| obj.get("path"))
                .and_then(|v| v.as_str())
                .map(|s| vec![s.to_string()])
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

/// Normalizes a path/id into a stable, OS-independent key (spec §4.6).
pub fn canonicalize(raw: &str) -> String {
    let mut s = raw.strip_prefix(r"\\?\").unwrap_or(raw).to_string();

    let is_unc = s.starts_with(r"\\") || s.starts_with("//");
    if is_unc {
        s = s.replacen(r"\\", "//", 1);
        s = s.replace('\\', "/");
        let rest = s.trim_start_matches('/');
        let collapsed = collapse_slashes(rest);
        s = format!("//{collapsed}");
    } else {
        s = s.replace('\\', "/");
        s = collapse_slashes(&s);
    }

    if let Some(colon) = s.find(':') {
        if colon == 1 && s.as_bytes()[0].is_ascii_alphabetic() && s[colon..].starts_with(":/") {
            let mut chars: Vec<char> = s.chars().collect();
            chars[0] = chars[0].to_ascii_uppercase();
            s = chars.into_iter().collect();
        }
    }

    s
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_collapses_backslashes_and_slash_runs() {
        assert_eq!(canonicalize(r"C:\repo\src\a.js"), "C:/repo/src/a.js");
        assert_eq!(canonicalize("c:/repo//src///a.js"), "C:/repo/src/a.js");
    }

    #[test]
    fn canonicalize_preserves_unc_prefix() {
        assert_eq!(canonicalize(r"\\host\share\a.js"), "//host/share/a.js");
    }

    #[test]
    fn canonicalize_strips_extended_length_prefix() {
        assert_eq!(canonicalize(r"\\?\C:\repo\a.js"), "C:/repo/a.js");
    }

    #[test]
    fn s5_merge_canonicalization_scenario() {
        let mut state = GraphState::new();
        let artifact_a = json!({
            "nodes": [{"id": "C:/repo/src/a.js", "type": "file", "state": "used", "lang": "javascript"}],
            "edges": [],
            "securityFindings": {"C:/repo/src/a.js": [{"ruleId": "eval.call", "severity": "high", "message": "m1", "line": 1, "snippet": "eval(x)"}]}
        });
        let artifact_b = json!({
            "nodes": [{"id": "C:\\repo\\src\\a.js", "type": "file", "state": "used", "lang": "javascript"}],
            "edges": [],
            "securityFindings": {"C:\\repo\\src\\a.js": [{"ruleId": "secret.literal", "severity": "critical", "message": "m2", "line": 2, "snippet": "x"}]}
        });
        state.ingest_artifact(&artifact_a);
        state.ingest_artifact(&artifact_b);

        assert_eq!(state.nodes.len(), 1);
        let findings = &state.security_findings["C:/repo/src/a.js"];
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn edge_endpoints_are_canonicalized() {
        let mut state = GraphState::new();
        state.ingest_artifact(&json!({
            "nodes": [{"id": "src/a.js", "type": "file", "state": "used"}],
            "edges": [{"source": "src\\a.js", "target": "src\\b.js", "kind": "import"}]
        }));
        let edge = &state.edges[0];
        assert_eq!(edge.source, "src/a.js");
        assert_eq!(edge.target, "src/b.js");
    }

    #[test]
    fn node_state_merge_prefers_used() {
        let mut state = GraphState::new();
        state.ingest_artifact(&json!({"nodes": [{"id": "a.js", "state": "unused", "type": "file"}]}));
        state.ingest_artifact(&json!({"nodes": [{"id": "a.js", "state": "used", "type": "file"}]}));
        assert_eq!(state.nodes["a.js"].state, "used");
    }

    #[test]
    fn malformed_node_and_edge_are_dropped_silently() {
        let mut state = GraphState::new();
        state.ingest_artifact(&json!({"nodes": [{"state": "used"}], "edges": [{"kind": "import"}]}));
        assert!(state.nodes.is_empty());
        assert!(state.edges.is_empty());
    }

    #[test]
    fn entrypoints_union_across_alias_keys_and_shapes() {
        let mut state = GraphState::new();
        state.ingest_artifact(&json!({"entrypoints": ["a.js"]}));
        state.ingest_artifact(&json!({"entryPoints": [{"id": "b.js"}]}));
        state.ingest_artifact(&json!({"entries": {"list": ["c.js"]}}));
        assert_eq!(state.entrypoints.len(), 3);
    }
}
