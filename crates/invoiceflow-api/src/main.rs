//! invoiceflow CLI and review API entry point.
//!
//! Binary name: `invflow`
//!
//! Parses CLI arguments, initializes tracing, the review-queue database and
//! the workflow runner, then dispatches to the command handler or starts the
//! review HTTP server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use invoiceflow_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_directive};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "invflow", &mut std::io::stdout());
        return Ok(());
    }

    let filter = verbosity_directive(cli.verbose, cli.quiet);
    init_tracing(filter, cli.otel).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.workflow.as_deref()).await?;

    match cli.command {
        Commands::Run { invoice, prefer } => {
            cli::run::handle_run(&state, &invoice, &prefer, cli.json, cli.quiet).await?;
        }

        Commands::Resume {
            checkpoint_id,
            prefer,
        } => {
            cli::run::handle_resume(&state, &checkpoint_id, &prefer, cli.json, cli.quiet).await?;
        }

        Commands::Review { action } => {
            cli::review::handle_review_command(action, &state, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| state.config.listen_host.clone());
            let port = port.unwrap_or(state.config.listen_port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} Review API listening on {}",
                    console::style("*").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }
            tracing::info!(%addr, data_dir = %state.data_dir.display(), "review API started");

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        // Handled before state initialization.
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
