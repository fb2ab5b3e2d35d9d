//! meique: a declarative build tool driven by Lua project descriptions
//!
//! `meique <dir>` configures the project described by `<dir>/meique.lua`
//! into the current directory; later invocations drive incremental builds,
//! cleaning, installation, and tests against the persisted cache.

use clap::Parser;
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod args;
mod driver;

use args::Args;
use driver::Meique;

fn main() {
    // VERBOSE is an integer level; anything above zero turns on debug
    // diagnostics. Logs go to stderr, build progress stays on stdout.
    let verbosity: u32 = meique_platform::get_env("VERBOSE").parse().unwrap_or(0);
    let level = if verbosity > 0 {
        Level::DEBUG
    } else {
        Level::INFO
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut meique = Meique::new(args);
    match meique.exec() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {e}", style("meique:").red().bold());
            std::process::exit(1);
        }
    }
}
