use clap::Parser;
use rotator::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
