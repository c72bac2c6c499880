//! Classification engine (spec §4.7): edge predicates, six per-profile
//! reachability sets, and closed-set status assignment.

use crate::merge::MergedEdge;
use crate::model::Profile;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The closed status set, declared in `STATUS_ORDER`'s GLOSSARY order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    ReachableCurrent,
    DeferredOnly,
    DynamicOnly,
    TestOnly,
    BuildTimeOnly,
    ReachableOtherProfile,
    DisconnectedAllProfiles,
}

/// Priority order from spec §4.7, least to most significant: when more than
/// one status applies to a node in a profile, the *last* true entry here is
/// `primary`. A node reached only through a dynamic edge is both
/// `reachable_current` and `dynamic_only`; `dynamic_only` sorts later here
/// so it wins, since it's the more specific, more actionable status.
const PRIORITY_ORDER: [Status; 7] = [
    Status::DisconnectedAllProfiles,
    Status::ReachableCurrent,
    Status::DeferredOnly,
    Status::DynamicOnly,
    Status::TestOnly,
    Status::BuildTimeOnly,
    Status::ReachableOtherProfile,
];

#[derive(Debug, Clone, Default)]
pub struct NodeClassification {
    pub status_by_profile: BTreeMap<String, BTreeSet<Status>>,
    pub primary_by_profile: BTreeMap<String, Status>,
    pub reachable_profiles: BTreeSet<String>,
}

fn field_is_true(extra: &BTreeMap<String, serde_json::Value>, key: &str) -> bool {
    matches!(extra.get(key), Some(serde_json::Value::Bool(true)))
}

fn field_str<'a>(extra: &'a BTreeMap<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    extra.get(key).and_then(|v| v.as_str())
}

pub fn is_deferred_edge(edge: &MergedEdge) -> bool {
    field_is_true(&edge.extra, "deferred")
        || field_is_true(&edge.extra, "lazy")
        || field_str(&edge.extra, "loading") == Some("deferred")
        || edge.kind.contains("defer")
        || edge.kind.contains("lazy")
}

pub fn is_dynamic_edge(edge: &MergedEdge) -> bool {
    field_is_true(&edge.extra, "dynamic")
        || field_is_true(&edge.extra, "reflection")
        || field_str(&edge.extra, "certainty") == Some("heuristic")
        || field_str(&edge.extra, "mode") == Some("runtime_dynamic")
        || edge.kind.contains("dynamic")
        || edge.kind.contains("require.ensure")
        || edge.kind.contains("eval")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Runtime,
    Test,
    Build,
}

pub fn edge_phase(edge: &MergedEdge) -> Phase {
    for key in ["phase", "stage", "scope", "context", "kind"] {
        if let Some(s) = field_str(&edge.extra, key).or_else(|| if key == "kind" { Some(edge.kind.as_str()) } else { None }) {
            let lower = s.to_ascii_lowercase();
            if lower.contains("test") {
                return Phase::Test;
            }
        }
    }
    for key in ["phase", "stage", "scope", "context", "kind"] {
        if let Some(s) = field_str(&edge.extra, key).or_else(|| if key == "kind" { Some(edge.kind.as_str()) } else { None }) {
            let lower = s.to_ascii_lowercase();
            if lower.contains("build") {
                return Phase::Build;
            }
        }
    }
    Phase::Runtime
}

pub fn is_edge_active_in_profile(edge: &MergedEdge, profile: &Profile) -> bool {
    if let Some(profiles) = edge.extra.get("profiles").and_then(|v| v.as_array()) {
        let listed: Vec<&str> = profiles.iter().filter_map(|v| v.as_str()).collect();
        if !listed.is_empty() && !listed.contains(&profile.name.as_str()) {
            return false;
        }
    }
    if let Some(p) = field_str(&edge.extra, "profile") {
        if p != profile.name {
            return false;
        }
    }
    if let Some(when) = field_str(&edge.extra, "when") {
        let allowed: Vec<&str> = when.split(',').map(str::trim).collect();
        if !allowed.is_empty() && !allowed.contains(&profile.name.as_str()) {
            return false;
        }
    }
    if let Some(flags) = edge.extra.get("flags").and_then(|v| v.as_object()) {
        for (k, v) in flags {
            if let Some(profile_v) = profile.flags.get(k) {
                if profile_v != v {
                    return false;
                }
            }
        }
    }
    true
}

struct Adjacency<'a> {
    by_source: HashMap<&'a str, Vec<&'a MergedEdge>>,
}

impl<'a> Adjacency<'a> {
    fn build(edges: &'a [MergedEdge], profile: &Profile, exclude: impl Fn(&MergedEdge) -> bool) -> Self {
        let mut by_source: HashMap<&str, Vec<&MergedEdge>> = HashMap::new();
        for edge in edges {
            if !is_edge_active_in_profile(edge, profile) || exclude(edge) {
                continue;
            }
            by_source.entry(edge.source.as_str()).or_default().push(edge);
        }
        Adjacency { by_source }
    }

    fn reachable_from(&self, entrypoints: &BTreeSet<String>) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = entrypoints.iter().cloned().collect();
        for e in entrypoints {
            seen.insert(e.clone());
        }
        while let Some(node) = stack.pop() {
            if let Some(outgoing) = self.by_source.get(node.as_str()) {
                for edge in outgoing {
                    if seen.insert(edge.target.clone()) {
                        stack.push(edge.target.clone());
                    }
                }
            }
        }
        seen
    }
}

struct ProfileReachability {
    all: BTreeSet<String>,
    no_deferred: BTreeSet<String>,
    no_dynamic: BTreeSet<String>,
    runtime: BTreeSet<String>,
    test: BTreeSet<String>,
    build: BTreeSet<String>,
}

fn compute_profile_reachability(edges: &[MergedEdge], entrypoints: &BTreeSet<String>, profile: &Profile) -> ProfileReachability {
    let all = Adjacency::build(edges, profile, |_| false).reachable_from(entrypoints);
    let no_deferred = Adjacency::build(edges, profile, is_deferred_edge).reachable_from(entrypoints);
    let no_dynamic = Adjacency::build(edges, profile, is_dynamic_edge).reachable_from(entrypoints);
    let runtime = Adjacency::build(edges, profile, |e| edge_phase(e) != Phase::Runtime).reachable_from(entrypoints);
    let test = Adjacency::build(edges, profile, |e| edge_phase(e) == Phase::Build).reachable_from(entrypoints);
    let build = Adjacency::build(edges, profile, |e| edge_phase(e) == Phase::Test).reachable_from(entrypoints);
    ProfileReachability { all, no_deferred, no_dynamic, runtime, test, build }
}

/// Classifies every node across every profile (spec §4.7).
pub fn classify(
    node_ids: impl Iterator<Item = String>,
    edges: &[MergedEdge],
    entrypoints: &BTreeSet<String>,
    profiles: &[Profile],
    keep_rules: &[Regex],
) -> BTreeMap<String, NodeClassification> {
    let reachability_by_profile: Vec<(String, ProfileReachability)> =
        profiles.iter().map(|p| (p.name.clone(), compute_profile_reachability(edges, entrypoints, p))).collect();

    let mut result: BTreeMap<String, NodeClassification> = BTreeMap::new();

    for id in node_ids {
        let mut classification = NodeClassification::default();
        let reachable_in_any = reachability_by_profile.iter().any(|(_, r)| r.all.contains(&id));
        if reachable_in_any {
            for (name, r) in &reachability_by_profile {
                if r.all.contains(&id) {
                    classification.reachable_profiles.insert(name.clone());
                }
            }
        }

        for (name, r) in &reachability_by_profile {
            let reachable_current = r.all.contains(&id);
            let matches_keep_rule = keep_rules.iter().any(|re| re.is_match(&id));

            let mut statuses = BTreeSet::new();
            let disconnected = !reachable_in_any;
            if disconnected {
                statuses.insert(Status::DisconnectedAllProfiles);
            }
            if reachable_current {
                statuses.insert(Status::ReachableCurrent);
            }
            if reachable_current && !r.no_deferred.contains(&id) {
                statuses.insert(Status::DeferredOnly);
            }
            if (reachable_current && !r.no_dynamic.contains(&id)) || (!reachable_current && matches_keep_rule) {
                statuses.insert(Status::DynamicOnly);
            }
            if !r.runtime.contains(&id) && r.test.contains(&id) {
                statuses.insert(Status::TestOnly);
            }
            if !r.runtime.contains(&id) && r.build.contains(&id) {
                statuses.insert(Status::BuildTimeOnly);
            }
            if !reachable_current && reachable_in_any {
                statuses.insert(Status::ReachableOtherProfile);
            }

            let primary = PRIORITY_ORDER.iter().rev().find(|s| statuses.contains(s)).copied().unwrap_or(Status::DisconnectedAllProfiles);

            classification.status_by_profile.insert(name.clone(), statuses);
            classification.primary_by_profile.insert(name.clone(), primary);
        }

        result.insert(id, classification);
    }

    result
}

/// Compiles keep-rule inputs (spec §4.7): plain strings, `RegExp`-like
/// objects (`{source, flags}`), `{regex, flags}`, or `{pattern, glob, flags}`.
/// Invalid patterns are silently dropped.
pub fn compile_keep_rules(inputs: &[serde_json::Value]) -> Vec<Regex> {
    inputs.iter().filter_map(compile_one_keep_rule).collect()
}

fn compile_one_keep_rule(v: &serde_json::Value) -> Option<Regex> {
    match v {
        serde_json::Value::String(s) => build_regex(s, ""),
        serde_json::Value::Object(obj) => {
            let flags = obj.get("flags").and_then(|v| v.as_str()).unwrap_or("");
            if let Some(pattern) = obj.get("pattern").and_then(|v| v.as_str()) {
                let is_glob = matches!(obj.get("glob"), Some(serde_json::Value::Bool(true)));
                let source = if is_glob { glob_to_regex(pattern) } else { pattern.to_string() };
                build_regex(&source, flags)
            } else if let Some(source) = obj.get("regex").and_then(|v| v.as_str()) {
                build_regex(source, flags)
            } else if let Some(source) = obj.get("source").and_then(|v| v.as_str()) {
                build_regex(source, flags)
            } else {
                None
            }
        }
        _ => None,
    }
}

const REGEX_META: &[char] = &['.', '+', '?', '(', ')', '[', ']', '{', '}', '^', '$', '|', '\\'];

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::new();
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            c if REGEX_META.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn build_regex(source: &str, flags: &str) -> Option<Regex> {
    let mut builder = RegexBuilder::new(source);
    if flags.contains('i') {
        builder.case_insensitive(true);
    }
    builder.build().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergedEdge;

    fn edge(source: &str, target: &str, kind: &str) -> MergedEdge {
        MergedEdge { source: source.to_string(), target: target.to_string(), kind: kind.to_string(), extra: BTreeMap::new() }
    }

    #[test]
    fn s6_classification_deferred_dynamic_scenario() {
        let edges = vec![edge("app", "a", "dynamic"), edge("a", "b", "import")];
        let mut entries = BTreeSet::new();
        entries.insert("app".to_string());
        let profiles = vec![Profile::default_profile()];
        let node_ids = vec!["app".to_string(), "a".to_string(), "b".to_string()];

        let result = classify(node_ids.into_iter(), &edges, &entries, &profiles, &[]);

        assert_eq!(result["a"].primary_by_profile["default"], Status::DynamicOnly);
        assert_eq!(result["b"].primary_by_profile["default"], Status::DynamicOnly);
        assert!(result["a"].status_by_profile["default"].contains(&Status::ReachableCurrent));
        assert!(!result["a"].status_by_profile["default"].contains(&Status::DeferredOnly));
    }

    #[test]
    fn disconnected_node_has_no_other_status() {
        let edges = vec![edge("app", "a", "import")];
        let mut entries = BTreeSet::new();
        entries.insert("app".to_string());
        let profiles = vec![Profile::default_profile()];
        let node_ids = vec!["app".to_string(), "a".to_string(), "orphan".to_string()];

        let result = classify(node_ids.into_iter(), &edges, &entries, &profiles, &[]);
        assert_eq!(result["orphan"].primary_by_profile["default"], Status::DisconnectedAllProfiles);
        assert_eq!(result["orphan"].status_by_profile["default"].len(), 1);
    }

    #[test]
    fn keep_rule_escalates_unreached_node_to_dynamic_only() {
        let edges = vec![edge("app", "a", "import")];
        let mut entries = BTreeSet::new();
        entries.insert("app".to_string());
        let profiles = vec![Profile::default_profile()];
        let node_ids = vec!["app".to_string(), "a".to_string(), "plugins/worker.js".to_string()];
        let keep = compile_keep_rules(&[serde_json::json!({"pattern": "plugins/*", "glob": true})]);

        let result = classify(node_ids.into_iter(), &edges, &entries, &profiles, &keep);
        assert_eq!(result["plugins/worker.js"].primary_by_profile["default"], Status::DynamicOnly);
    }

    #[test]
    fn invalid_keep_rule_pattern_is_dropped() {
        let rules = compile_keep_rules(&[serde_json::json!("[unterminated"), serde_json::json!("valid.*")]);
        assert_eq!(rules.len(), 1);
    }
}
