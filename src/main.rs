use clap::Parser;
use colored::*;
use tarstore::cli::{self, App};

fn main() {
    env_logger::init();

    let app = App::parse();
    if let Err(e) = cli::run(app) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
