//! `jsDependencies.json` crawler binary (spec §6): no flags, crawls the
//! current directory, writes its artifact, exits with the resulting code.

use depgraph_core::fsutil;
use depgraph_core::lang::js;
use depgraph_core::model::Lang;

fn main() {
    let code = depgraph_cli::run_crawler(Lang::Javascript, |root| js::crawl(root, &fsutil::default_skip_dirs()));
    std::process::exit(code);
}
