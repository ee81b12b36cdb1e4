//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use std::fs::File;
use std::io::Write;

use clap::Parser;

use args::Cli;
use crate::error::Error;

/// Parses `argv`, runs the query, and returns the process exit code
/// (spec.md §6/§7: `0` success, `5` system error, `10` HTML error, `15`
/// script error). Errors go to `-E FILE` if given, stderr otherwise.
pub fn run() -> i32 {
    let cli = Cli::parse();
    let errors_path = cli.errors.clone();
    match commands::run::run(cli) {
        Ok(()) => crate::error::EXIT_OK,
        Err(e) => {
            report_error(&e, errors_path.as_deref());
            e.exit_code()
        }
    }
}

fn report_error(e: &Error, errors_path: Option<&std::path::Path>) {
    let message = format!("htq: {e}\n");
    match errors_path {
        Some(path) => match File::create(path) {
            Ok(mut f) => {
                let _ = f.write_all(message.as_bytes());
            }
            Err(_) => eprint!("{message}"),
        },
        None => eprint!("{message}"),
    }
}
