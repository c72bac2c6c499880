//! Optional `--watch` mode: a debounced filesystem watcher that re-runs the
//! crawl-and-merge pipeline for a repo after its tree goes quiet. Unlike a
//! source index, a merged dependency graph has no cheap incremental update —
//! a changed file can move a node from `reachable_current` to
//! `disconnected_all_profiles` system-wide, so a settled batch triggers a
//! full recrawl of the owning repo rather than a per-file patch.

use crate::orchestrate;
use crate::state::ServerState;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const DEBOUNCE_MS: u64 = 500;

/// Starts watching every repo root. Returns the watcher handle — dropping it
/// stops the watch.
pub fn start_watcher(state: Arc<RwLock<ServerState>>) -> Option<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel::<Event>();

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(err) => {
            tracing::warn!(%err, "failed to create file watcher");
            return None;
        }
    };

    {
        let guard = state.blocking_read();
        for repo in guard.repos.values() {
            if let Err(err) = watcher.watch(&repo.root, RecursiveMode::Recursive) {
                tracing::warn!(root = %repo.root.display(), %err, "failed to watch repo root");
            } else {
                tracing::info!(root = %repo.root.display(), "watching for changes");
            }
        }
    }

    std::thread::spawn(move || debounce_loop(rx, state));

    Some(watcher)
}

fn debounce_loop(rx: mpsc::Receiver<Event>, state: Arc<RwLock<ServerState>>) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_));
                if relevant {
                    let now = Instant::now();
                    for path in event.paths {
                        pending.insert(path, now);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let cutoff = Instant::now() - Duration::from_millis(DEBOUNCE_MS);
                let ready: Vec<PathBuf> = pending.iter().filter(|(_, t)| **t <= cutoff).map(|(p, _)| p.clone()).collect();
                if ready.is_empty() {
                    continue;
                }
                for path in &ready {
                    pending.remove(path);
                }
                recrawl_owning_repos(&ready, &state);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn recrawl_owning_repos(paths: &[PathBuf], state: &Arc<RwLock<ServerState>>) {
    let mut guard = state.blocking_write();
    let mut touched: Vec<String> = Vec::new();
    for repo in guard.repos.values() {
        if paths.iter().any(|p| p.starts_with(&repo.root)) {
            touched.push(repo.name.clone());
        }
    }
    for name in touched {
        if let Some(repo) = guard.repos.get_mut(&name) {
            tracing::info!(repo = %name, "change detected, recrawling");
            orchestrate::crawl_and_merge(&repo.root.clone(), &mut repo.graph);
            repo.reclassify();
            repo.last_crawl = Some(Instant::now());
        }
    }
}
