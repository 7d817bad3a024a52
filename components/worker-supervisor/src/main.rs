//! `worker-supervisor` binary.

use worker_supervisor::cli;

#[tokio::main]
async fn main() {
    // Main entrypoint simply delegates control to CLI layer.
    // The exit status encodes how the worker ended for the supervising agent.
    let status = cli::cli::run().await;
    std::process::exit(status.code());
}
