//! The `bookaimark` binary is thin: argument parsing and process setup live in
//! `cli/`, the HTTP surface in the `bookaimark_server` library, and the data
//! layer in `bookaimark`. This file only invokes `cli::run()` and turns an error
//! into a non-zero exit.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
