//! Shared runner for the eight per-language crawler executables (spec §6):
//! each binary crawls the current directory with no flags, writes its fixed
//! artifact filename, and reports success via exit code.

use depgraph_core::error::CrawlError;
use depgraph_core::model::{Graph, Lang};
use std::path::PathBuf;

pub fn init_tracing(lang: Lang) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(format!("depgraph={}", tracing::Level::WARN).parse().unwrap()))
        .with_target(false)
        .try_init();
    tracing::debug!(lang = lang.as_str(), "crawler starting");
}

/// Validates the crawl root, then hands off to `crawl`. On success, writes
/// the language's artifact and returns 0; an invalid root aborts with
/// [`CrawlError::EXIT_CODE`] per spec §7.
pub fn run_crawler(lang: Lang, crawl: impl FnOnce(&std::path::Path) -> Graph) -> i32 {
    init_tracing(lang);

    let root: PathBuf = match std::env::current_dir() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "could not determine current directory");
            return CrawlError::EXIT_CODE;
        }
    };

    if !root.is_dir() {
        tracing::error!(error = %CrawlError::InvalidRoot(root.clone()), "invalid crawl root");
        return CrawlError::EXIT_CODE;
    }

    let graph = crawl(&root);
    match depgraph_core::emit::write_artifact(&root, lang, &graph, None) {
        Ok(()) => {
            tracing::info!(
                nodes = graph.nodes.len(),
                edges = graph.edges.len(),
                "wrote {}",
                depgraph_core::emit::filename_for(lang)
            );
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to write artifact");
            1
        }
    }
}

/// Like [`run_crawler`], but also writes a `pythonDependencies.json`
/// sidecar artifact for backward compatibility with tooling that expects
/// the older filename.
pub fn run_python_crawler(crawl: impl FnOnce(&std::path::Path) -> Graph) -> i32 {
    init_tracing(Lang::Python);

    let root: PathBuf = match std::env::current_dir() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "could not determine current directory");
            return CrawlError::EXIT_CODE;
        }
    };

    if !root.is_dir() {
        tracing::error!(error = %CrawlError::InvalidRoot(root.clone()), "invalid crawl root");
        return CrawlError::EXIT_CODE;
    }

    let graph = crawl(&root);
    let canonical = depgraph_core::emit::write_artifact(&root, Lang::Python, &graph, None);
    let legacy = depgraph_core::emit::write_python_legacy_artifact(&root, &graph);
    match (canonical, legacy) {
        (Ok(()), Ok(())) => {
            tracing::info!(nodes = graph.nodes.len(), edges = graph.edges.len(), "wrote pyDependencies.json and pythonDependencies.json");
            0
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "failed to write artifact");
            1
        }
    }
}
