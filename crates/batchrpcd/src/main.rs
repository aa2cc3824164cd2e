//! Entry point for the batchrpc daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match batchrpcd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr(), "batchrpcd: {error}");
            ExitCode::FAILURE
        }
    }
}
