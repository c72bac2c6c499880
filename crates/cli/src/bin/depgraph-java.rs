//! `javaDependencies.json` crawler binary (spec §6).

use depgraph_core::fsutil;
use depgraph_core::lang::java;
use depgraph_core::model::Lang;

fn main() {
    let code = depgraph_cli::run_crawler(Lang::Java, |root| java::crawl(root, &fsutil::default_skip_dirs()));
    std::process::exit(code);
}
