//! `dartDependencies.json` crawler binary — self-hosted language (L-self),
//! realized as Dart (spec §6).

use depgraph_core::fsutil;
use depgraph_core::lang::dart;
use depgraph_core::model::Lang;

fn main() {
    let code = depgraph_cli::run_crawler(Lang::Dart, |root| dart::crawl(root, &fsutil::default_skip_dirs()));
    std::process::exit(code);
}
