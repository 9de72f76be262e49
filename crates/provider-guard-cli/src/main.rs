use provider_guard_cli::run_cli;
use tracing::error;

// Simulations pause tokio's clock, which needs the current-thread runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Run CLI and handle errors
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);
        // Logging may not be initialized yet when configuration fails to load
        eprintln!("Error: {}", e);

        std::process::exit(e.exit_code());
    }
}
