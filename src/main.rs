//! clipflow CLI binary
//!
//! Minimal entrypoint; all logic lives in the library. main only maps the
//! run result to a process exit code.

fn main() {
    if let Err(e) = clipflow::cli::run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
