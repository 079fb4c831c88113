//! scout CLI - run transforms over a reconnaissance graph
//!
//! Builds the built-in transform registry and hands the command line to
//! [`scout::cli::main_with`].

use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let registry = match scout::builtin_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    scout::cli::main_with(registry, std::env::args_os()).await
}
