use clap::Parser;
use futcore::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
