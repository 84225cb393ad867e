use clap::Parser;
use sentinel::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
