//! Circulation Desk - library lending from the command line

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = circulation_desk::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
