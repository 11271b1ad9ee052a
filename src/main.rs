//! Assetflow - command-line front-end asset pipeline

use std::process::ExitCode;

use assetflow::cli;

fn main() -> ExitCode {
    cli::run()
}
