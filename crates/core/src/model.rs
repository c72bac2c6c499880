//! Core data model shared by every crawler and the merge/classification
//! engines: [`Node`], [`Edge`], [`FileFacts`], [`Finding`], [`ExportSummary`],
//! [`Profile`], and the crawler-local [`Graph`] they live in — spec §3.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Node / Edge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    File,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Used,
    Unused,
    SideEffectOnly,
}

impl NodeState {
    /// `used` > `side_effect_only` > `unused`, per the merge policy (spec §4.6).
    fn rank(self) -> u8 {
        match self {
            NodeState::Used => 2,
            NodeState::SideEffectOnly => 1,
            NodeState::Unused => 0,
        }
    }

    pub fn merge(self, other: NodeState) -> NodeState {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Static,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
    Javascript,
    Python,
    Go,
    Rust,
    Java,
    Kotlin,
    Csharp,
    Dart,
    External,
}

impl Lang {
    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Javascript => "javascript",
            Lang::Python => "python",
            Lang::Go => "go",
            Lang::Rust => "rust",
            Lang::Java => "java",
            Lang::Kotlin => "kotlin",
            Lang::Csharp => "csharp",
            Lang::Dart => "dart",
            Lang::External => "external",
        }
    }
}

/// A single node identity field (package/module/namespace/crate/fqn/declaration);
/// language-specific, so we keep it as a generic labeled string rather than one
/// field per language. Serializes as `{ "<key>": "<value>" }` so it can be
/// `#[serde(flatten)]`-ed into [`Node`].
#[derive(Debug, Clone)]
pub struct IdentityField {
    pub key: &'static str,
    pub value: String,
}

impl Serialize for IdentityField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.key, &self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub state: NodeState,
    pub lang: Lang,
    #[serde(rename = "sizeLOC", skip_serializing_if = "Option::is_none")]
    pub size_loc: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", flatten)]
    pub identity: Option<IdentityField>,
    #[serde(rename = "hasSideEffects", skip_serializing_if = "Option::is_none")]
    pub has_side_effects: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(rename = "inDeg")]
    pub in_deg: usize,
    #[serde(rename = "outDeg")]
    pub out_deg: usize,
    /// `static` (lexical) or `heuristic` (best-effort) confidence for this
    /// node's resolution; not part of the wire schema, used internally by
    /// classification's keep-rule escalation.
    #[serde(skip)]
    pub certainty: Certainty,
}

impl Node {
    pub fn file(id: impl Into<String>, lang: Lang) -> Self {
        Node {
            id: id.into(),
            node_type: NodeType::File,
            state: NodeState::Unused,
            lang,
            size_loc: None,
            identity: None,
            has_side_effects: None,
            sha256: None,
            in_deg: 0,
            out_deg: 0,
            certainty: Certainty::Static,
        }
    }

    pub fn external(id: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            node_type: NodeType::External,
            state: NodeState::Used,
            lang: Lang::External,
            size_loc: None,
            identity: None,
            has_side_effects: None,
            sha256: None,
            in_deg: 0,
            out_deg: 0,
            certainty: Certainty::Static,
        }
    }
}

/// The closed set of edge kinds from spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Import,
    Reexport,
    Require,
    Dynamic,
    SideEffect,
    From,
    FromRelative,
    ImportStar,
    ImportStatic,
    ImportWildcard,
    Use,
    Mod,
    Extern,
    Using,
    UsingStatic,
    NamespacePeer,
    Part,
    PartOf,
    Export,
}

impl EdgeKind {
    pub fn label(self) -> &'static str {
        match self {
            EdgeKind::Import => "import",
            EdgeKind::Reexport => "reexport",
            EdgeKind::Require => "require",
            EdgeKind::Dynamic => "dynamic",
            EdgeKind::SideEffect => "side_effect",
            EdgeKind::From => "from",
            EdgeKind::FromRelative => "from_relative",
            EdgeKind::ImportStar => "import_star",
            EdgeKind::ImportStatic => "import_static",
            EdgeKind::ImportWildcard => "import_wildcard",
            EdgeKind::Use => "use",
            EdgeKind::Mod => "mod",
            EdgeKind::Extern => "extern",
            EdgeKind::Using => "using",
            EdgeKind::UsingStatic => "using_static",
            EdgeKind::NamespacePeer => "namespace_peer",
            EdgeKind::Part => "part",
            EdgeKind::PartOf => "part-of",
            EdgeKind::Export => "export",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub certainty: Certainty,
}

// ---------------------------------------------------------------------------
// FileFacts — transient, produced by extractors, consumed by resolver/emitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ImportRef {
    /// The raw specifier as written in source (e.g. `./util`, `a.b.c`, `fmt`).
    pub specifier: String,
    pub kind: EdgeKind,
    pub certainty: Certainty,
    /// 1-based source line, for diagnostics; not emitted.
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    pub abs_path: PathBuf,
    pub rel_id: String,
    pub package_or_module: Option<IdentityField>,
    pub declared_names: Vec<String>,
    pub imports: Vec<ImportRef>,
    pub entry_marker: bool,
    pub loc: usize,
    pub sha256: Option<String>,
    pub findings: Vec<Finding>,
    pub has_side_effects: bool,
}

// ---------------------------------------------------------------------------
// Finding (security)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Med,
    High,
    Critical,
    Unknown,
}

impl Severity {
    /// Maps synonyms to canonical severities (spec §4.4).
    pub fn normalize(raw: &str) -> Severity {
        match raw.to_ascii_lowercase().as_str() {
            "info" => Severity::Info,
            "low" => Severity::Low,
            "med" | "medium" | "warn" | "warning" => Severity::Med,
            "high" | "severe" => Severity::High,
            "critical" | "crit" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Byte offsets into the sanitized/raw text the rule matched against;
    /// used for per-file dedup, not emitted.
    #[serde(skip)]
    pub start_offset: usize,
    #[serde(skip)]
    pub end_offset: usize,
}

impl Finding {
    /// Merge-identity tuple from spec §3: `(severityNormalized, ruleId, line, message, code)`.
    pub fn merge_key(&self) -> (Severity, String, usize, String, Option<String>) {
        (self.severity, self.rule_id.clone(), self.line, self.message.clone(), self.code.clone())
    }

    /// Per-file dedup identity from spec §4.4: `(ruleId, startOffset, endOffset)`.
    pub fn dedup_key(&self) -> (String, usize, usize) {
        (self.rule_id.clone(), self.start_offset, self.end_offset)
    }
}

// ---------------------------------------------------------------------------
// ExportSummary
// ---------------------------------------------------------------------------

/// Per-file export summary: category name -> opaque JSON entries. Categories
/// and their contents are language-specific and opaque to the merge engine.
pub type ExportSummary = BTreeMap<String, Vec<serde_json::Value>>;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl Profile {
    pub fn default_profile() -> Profile {
        Profile { name: "default".to_string(), flags: BTreeMap::new() }
    }
}

// ---------------------------------------------------------------------------
// Per-crawler graph (node+edge container before emission)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    /// `(source, target, kind)` uniqueness guard, mirrored into `edges`.
    pub edge_keys: BTreeSet<(String, String, EdgeKind)>,
    pub edges: Vec<Edge>,
    pub entrypoints: BTreeSet<String>,
    /// file id -> findings, source-order then by match offset (dedup applied
    /// upstream in the security engine).
    pub findings: BTreeMap<String, Vec<Finding>>,
    pub exports: BTreeMap<String, ExportSummary>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_node(&mut self, node: Node) {
        self.nodes
            .entry(node.id.clone())
            .and_modify(|existing| {
                existing.state = existing.state.merge(node.state);
            })
            .or_insert(node);
    }

    /// Adds an edge, enforcing the `(source, target, kind)` uniqueness
    /// invariant (spec §3). Returns `false` if the edge was a duplicate.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let key = (edge.source.clone(), edge.target.clone(), edge.kind);
        if !self.edge_keys.insert(key) {
            return false;
        }
        self.edges.push(edge);
        true
    }
}
