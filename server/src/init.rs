//! CLI subcommands `init` and `doctor`.
//!
//! `init` scaffolds a default `.depgraph.toml`. `doctor` reports which of the
//! eight crawler executables are discoverable and validates the target root
//! early — the spec §7 invalid-root case surfaced before a real crawl runs.

use crate::discovery;
use std::path::PathBuf;

fn resolve_root(args: &[String]) -> PathBuf {
    let path_arg = args.iter().skip(1).find(|a| !a.starts_with('-'));

    let root = match path_arg {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|err| {
            eprintln!("Error: could not determine current directory: {err}");
            std::process::exit(1);
        }),
    };

    root.canonicalize().unwrap_or_else(|err| {
        eprintln!("Error: path '{}' not found: {err}", root.display());
        std::process::exit(1);
    })
}

pub fn run_init(args: &[String]) -> i32 {
    let root = resolve_root(args);
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("depgraph-server {version} init");
    eprintln!("  Project root: {}", root.display());

    let config_path = root.join(".depgraph.toml");
    if config_path.exists() {
        eprintln!("  .depgraph.toml already exists, leaving it untouched");
        return 0;
    }

    let default_config = r#"# depgraph configuration
# extra_skip_dirs = ["generated"]

[[profiles]]
name = "default"
"#;

    if let Err(err) = std::fs::write(&config_path, default_config) {
        eprintln!("Error: could not write {}: {err}", config_path.display());
        return 1;
    }

    eprintln!("  Wrote {}", config_path.display());
    0
}

pub fn run_doctor(args: &[String]) -> i32 {
    let root = resolve_root(args);
    let version = env!("CARGO_PKG_VERSION");
    let mut has_warn = false;
    let mut has_fail = false;

    eprintln!("depgraph-server doctor");
    eprintln!();
    eprintln!("  [PASS] depgraph-server v{version}");

    if !root.is_dir() {
        eprintln!("  [FAIL] root is not a directory: {}", root.display());
        has_fail = true;
    } else {
        eprintln!("  [PASS] root exists: {}", root.display());
    }

    let config_path = root.join(".depgraph.toml");
    if config_path.exists() {
        match std::fs::read_to_string(&config_path).unwrap_or_default().parse::<toml::Table>() {
            Ok(_) => eprintln!("  [PASS] .depgraph.toml exists and is valid TOML"),
            Err(err) => {
                eprintln!("  [FAIL] .depgraph.toml exists but is invalid: {err}");
                has_fail = true;
            }
        }
    } else {
        eprintln!("  [WARN] .depgraph.toml not found (will use defaults)");
        has_warn = true;
    }

    eprintln!();
    eprintln!("  Crawler executables:");
    for (lang, exe) in discovery::discover_all() {
        match exe {
            Some(path) => eprintln!("  [PASS] {} -> {}", discovery::binary_name(lang), path.display()),
            None => {
                eprintln!("  [WARN] {} not found on PATH or alongside depgraph-server", discovery::binary_name(lang));
                has_warn = true;
            }
        }
    }

    eprintln!();
    if has_fail {
        eprintln!("  Result: FAIL");
        2
    } else if has_warn {
        eprintln!("  Result: WARN");
        0
    } else {
        eprintln!("  Result: PASS");
        0
    }
}
