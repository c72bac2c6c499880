//! Python crawler binary (spec §6): writes both the canonical
//! `pyDependencies.json` and a `pythonDependencies.json` sidecar for
//! backward compatibility with tooling that still expects the older
//! filename.

use depgraph_core::fsutil;
use depgraph_core::lang::python;

fn main() {
    let code = depgraph_cli::run_python_crawler(|root| python::crawl(root, &fsutil::default_skip_dirs()));
    std::process::exit(code);
}
