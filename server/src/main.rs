//! `depgraph-server` binary — thin CLI shell over the [`depgraph_server`] library crate.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use depgraph_server::state::{AppContext, RepoState, ServerState};
use depgraph_server::{build_router, orchestrate, watch};

/// Orchestrator for the polyglot dependency & security graph analyzer.
#[derive(Parser)]
#[command(name = "depgraph-server", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root directory (default: current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Named repository (repeatable, format: NAME=PATH)
    #[arg(long = "repo", value_name = "NAME=PATH")]
    repos: Vec<String>,

    /// Watch repo roots and re-crawl on change
    #[arg(long)]
    watch: bool,

    /// Bind to 0.0.0.0 instead of 127.0.0.1 (localhost)
    #[arg(long)]
    bind_all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a default .depgraph.toml
    Init {
        path: Option<PathBuf>,
    },
    /// Check project setup and crawler discoverability
    Doctor {
        path: Option<PathBuf>,
    },
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("depgraph=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        match command {
            Commands::Init { path } => {
                let mut args = vec!["init".to_string()];
                if let Some(p) = path {
                    args.push(p.display().to_string());
                }
                std::process::exit(depgraph_server::init::run_init(&args));
            }
            Commands::Doctor { path } => {
                let mut args = vec!["doctor".to_string()];
                if let Some(p) = path {
                    args.push(p.display().to_string());
                }
                std::process::exit(depgraph_server::init::run_doctor(&args));
            }
        }
    }

    let mut repo_specs: Vec<(String, PathBuf)> = Vec::new();
    for spec in &cli.repos {
        match spec.split_once('=') {
            Some((name, path)) => {
                let root = PathBuf::from(path).canonicalize().unwrap_or_else(|err| {
                    eprintln!("Error: repo path '{path}' not found: {err}");
                    std::process::exit(1);
                });
                repo_specs.push((name.to_string(), root));
            }
            None => {
                eprintln!("Error: --repo must be NAME=PATH, got '{spec}'");
                std::process::exit(1);
            }
        }
    }

    if repo_specs.is_empty() {
        let root = cli.root.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
        let root = root.canonicalize().unwrap_or_else(|err| {
            eprintln!("Error: path '{}' not found: {err}", root.display());
            std::process::exit(1);
        });
        repo_specs.push(("default".to_string(), root));
    }

    let mut repos: BTreeMap<String, RepoState> = BTreeMap::new();
    for (name, root) in repo_specs {
        if !root.is_dir() {
            eprintln!("Error: crawl root does not exist or is not a directory: {}", root.display());
            std::process::exit(depgraph_core::error::CrawlError::EXIT_CODE);
        }
        let mut repo = RepoState::new(name.clone(), root.clone());
        info!(repo = %name, root = %root.display(), "crawling");
        orchestrate::crawl_and_merge(&root, &mut repo.graph);
        repo.reclassify();
        repos.insert(name, repo);
    }

    let state = Arc::new(RwLock::new(ServerState::new(repos)));
    let ctx = AppContext { state: Arc::clone(&state), start_time: std::time::Instant::now() };

    let _watcher = if cli.watch { watch::start_watcher(Arc::clone(&state)) } else { None };

    let app = build_router(ctx);

    let bind_addr = if cli.bind_all { "0.0.0.0" } else { "127.0.0.1" };
    let explicit_port: Option<u16> = std::env::var("PORT").ok().and_then(|p| p.parse().ok());

    let listener = if let Some(port) = explicit_port {
        tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await.unwrap_or_else(|err| {
            eprintln!("Error: could not bind {bind_addr}:{port}: {err}");
            eprintln!("  PORT was set explicitly. Choose a different port.");
            std::process::exit(1);
        })
    } else {
        let mut bound = None;
        for port in 8732u16..8742 {
            if let Ok(listener) = tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await {
                bound = Some(listener);
                break;
            }
        }
        bound.unwrap_or_else(|| {
            eprintln!("Error: could not find a free port in 8732..8742.");
            eprintln!("  Try: PORT=<port> depgraph-server");
            std::process::exit(1);
        })
    };

    let addr = listener.local_addr().expect("bound listener has a local address");
    info!(addr = %addr, "depgraph-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}
