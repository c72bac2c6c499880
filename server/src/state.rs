//! Shared server state: one [`RepoState`] per configured repository root,
//! held behind a single `RwLock` so merges and reads never interleave
//! (spec §5 concurrency model).

use depgraph_core::classify::{self, NodeClassification};
use depgraph_core::config::DepgraphConfig;
use depgraph_core::merge::GraphState;
use depgraph_core::model::Profile;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

pub struct RepoState {
    pub name: String,
    pub root: PathBuf,
    pub config: DepgraphConfig,
    pub profiles: Vec<Profile>,
    pub keep_rules: Vec<Regex>,
    pub graph: GraphState,
    pub classification: BTreeMap<String, NodeClassification>,
    pub last_crawl: Option<Instant>,
}

impl RepoState {
    pub fn new(name: String, root: PathBuf) -> Self {
        let config = DepgraphConfig::load(&root);
        let profiles = config.profiles();
        let keep_rules = classify::compile_keep_rules(&config.keep_rule_values());
        RepoState {
            name,
            root,
            config,
            profiles,
            keep_rules,
            graph: GraphState::new(),
            classification: BTreeMap::new(),
            last_crawl: None,
        }
    }

    /// Recomputes `classification` from the current `graph` against this
    /// repo's profiles and keep rules. Called after every merge.
    pub fn reclassify(&mut self) {
        self.classification = classify::classify(
            self.graph.nodes.keys().cloned(),
            &self.graph.edges,
            &self.graph.entrypoints,
            &self.profiles,
            &self.keep_rules,
        );
    }
}

/// Every configured repository, keyed by its `--repo NAME=PATH` name (or
/// `"default"` for a bare `--root`).
pub struct ServerState {
    pub repos: BTreeMap<String, RepoState>,
}

impl ServerState {
    pub fn new(repos: BTreeMap<String, RepoState>) -> Self {
        ServerState { repos }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub state: std::sync::Arc<tokio::sync::RwLock<ServerState>>,
    pub start_time: Instant,
}
