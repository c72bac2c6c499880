//! Runs every discovered crawler against a repository root, sequentially,
//! and merges their artifacts into a [`GraphState`] (spec §5, §6).

use crate::discovery;
use depgraph_core::merge::GraphState;
use depgraph_core::model::Lang;
use std::path::Path;
use std::process::Command;

/// Invokes every discovered crawler with `cwd = root` and no flags, then
/// ingests whichever fixed-name artifacts exist afterward, in language
/// order. A crawler that exits non-zero only gets a warning logged — its
/// artifact, if it wrote one anyway, is still consumed (spec §6).
pub fn crawl_and_merge(root: &Path, graph: &mut GraphState) {
    graph.reset();

    for (lang, exe) in discovery::discover_all() {
        let Some(exe) = exe else {
            tracing::debug!(lang = lang.as_str(), "no crawler executable found, skipping");
            continue;
        };

        match Command::new(&exe).current_dir(root).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                tracing::warn!(lang = lang.as_str(), code = status.code(), "crawler exited non-zero");
            }
            Err(err) => {
                tracing::warn!(lang = lang.as_str(), %err, "failed to spawn crawler");
                continue;
            }
        }

        ingest_language_artifacts(root, lang, graph);
    }
}

fn ingest_language_artifacts(root: &Path, lang: Lang, graph: &mut GraphState) {
    let filename = depgraph_core::emit::filename_for(lang);
    ingest_one(root, filename, graph);

    if lang == Lang::Python {
        ingest_one(root, "pythonDependencies.json", graph);
    }
}

fn ingest_one(root: &Path, filename: &str, graph: &mut GraphState) {
    let path = root.join(filename);
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return;
    };
    match serde_json::from_str(&raw) {
        Ok(value) => graph.ingest_artifact(&value),
        Err(err) => tracing::warn!(file = %path.display(), %err, "malformed crawler artifact, skipping"),
    }
}
